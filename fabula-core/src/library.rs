//! Stories bundled with the application.

use crate::graph::{Choice, GraphError, StoryGraph, StoryNode};
use crate::source::StoryMeta;

fn branch(id: &str, content: &str, first: (&str, &str), second: (&str, &str)) -> StoryNode {
    StoryNode::branch(
        id,
        content,
        Choice::new(first.0, first.1),
        Choice::new(second.0, second.1),
    )
}

/// Every bundled story with its metadata.
pub fn all() -> Result<Vec<(StoryMeta, StoryGraph)>, GraphError> {
    Ok(vec![
        (StoryMeta::new("leonRaton", "El león y el ratón"), leon_raton()?),
        (StoryMeta::new("forest", "El bosque brillante"), forest()?),
        (StoryMeta::new("midnight", "Medianoche en la ciudad"), midnight()?),
        (StoryMeta::new("spaceship", "La nave silenciosa"), spaceship()?),
    ])
}

/// The lion and the mouse fable. Stored under `leonRaton`.
pub fn leon_raton() -> Result<StoryGraph, GraphError> {
    StoryGraph::from_nodes([
        branch(
            "start",
            "Un león dormía plácidamente bajo un gran árbol. De pronto, un pequeño ratón corre por su cuerpo y lo despierta.",
            ("Atrapar al ratón", "catchMouse"),
            ("Dejarlo escapar", "letGo"),
        ),
        branch(
            "catchMouse",
            "El león atrapa al ratón con su gran garra. El ratón, temblando, le pide que lo perdone y promete ayudarlo algún día.",
            ("Perdonarlo", "letGo"),
            ("Comérselo", "finalEat"),
        ),
        branch(
            "letGo",
            "El león deja ir al ratón, pensando que un animal tan pequeño nunca podría ayudarle. Días después, el león cae en una trampa de cazadores.",
            ("Rugir pidiendo ayuda", "callForHelp"),
            ("Intentar romper la red solo", "tryAlone"),
        ),
        branch(
            "callForHelp",
            "El ratón escucha los rugidos y corre hacia el león. Comienza a roer las cuerdas de la red.",
            ("Agradecerle", "finalFree"),
            ("Seguir rugiendo", "finalFree"),
        ),
        branch(
            "tryAlone",
            "El león lucha con fuerza, pero las cuerdas son demasiado resistentes. Sin embargo, el ratón aparece y comienza a ayudarlo.",
            ("Agradecerle", "finalFree"),
            ("Seguir intentando romper la red", "finalFree"),
        ),
        StoryNode::ending(
            "finalFree",
            "El ratón logra liberar al león. El león, sorprendido y agradecido, comprende que incluso el más pequeño puede ayudar al más grande. Fin.",
        ),
        StoryNode::ending(
            "finalEat",
            "El león devora al ratón. Nunca descubre que un día ese pequeño habría podido salvarle la vida. Fin.",
        ),
    ])
}

/// A walk through a glowing forest. Stored under `forest`.
pub fn forest() -> Result<StoryGraph, GraphError> {
    StoryGraph::from_nodes([
        branch(
            "start",
            "Te despiertas en un bosque brillante. Un sendero se divide en dos. A la izquierda, calma; a la derecha, escuchas risas lejanas...",
            ("Tomar el sendero izquierdo", "left1"),
            ("Ir por la derecha", "right1"),
        ),
        branch(
            "left1",
            "Avanzas por el sendero tranquilo y encuentras una señal de madera con símbolos extraños.",
            ("Seguir la señal", "left2A"),
            ("Ignorarla y continuar", "left2B"),
        ),
        branch(
            "right1",
            "Sigues las risas y hallas un claro con luciérnagas. Una figura con capa te saluda.",
            ("Saludar a la figura", "right2A"),
            ("Ocultarte y observar", "right2B"),
        ),
        branch(
            "left2A",
            "La señal te guía a un puente de piedra sobre un río esmeralda que susurra tu nombre.",
            ("Cruzar el puente", "finalA1"),
            ("Bordear el río", "finalA2"),
        ),
        branch(
            "left2B",
            "Ignoras la señal y descubres un árbol hueco que parece invitarte a entrar.",
            ("Entrar al árbol", "finalB1"),
            ("Rodearlo con cuidado", "finalB2"),
        ),
        branch(
            "right2A",
            "La figura ríe y te ofrece una moneda brillante: 'cara, guía; cruz, misterio'.",
            ("Elegir cara", "finalC1"),
            ("Elegir cruz", "finalC2"),
        ),
        branch(
            "right2B",
            "Desde las sombras ves un mapa grabado en una roca, marcado con una X.",
            ("Seguir el mapa", "finalD1"),
            ("Confiar en tu instinto", "finalD2"),
        ),
        StoryNode::ending(
            "finalA1",
            "Cruzas el puente y el río te bendice con un camino dorado. Fin.",
        ),
        StoryNode::ending(
            "finalA2",
            "Bordeas el río y una barca te lleva a casa. Fin.",
        ),
        StoryNode::ending(
            "finalB1",
            "Dentro del árbol, un guardián te nombra Protector del Bosque. Fin.",
        ),
        StoryNode::ending(
            "finalB2",
            "Rodeas el árbol y hallas un claro de descanso eterno. Fin.",
        ),
        StoryNode::ending(
            "finalC1",
            "Cara: una estrella te guía al castillo de cristal. Fin.",
        ),
        StoryNode::ending(
            "finalC2",
            "Cruz: un sendero secreto revela viejos amigos. Fin.",
        ),
        StoryNode::ending(
            "finalD1",
            "Sigues la X y recuperas un tesoro olvidado. Fin.",
        ),
        StoryNode::ending(
            "finalD2",
            "Tu instinto te lleva a la salida del bosque. Fin.",
        ),
    ])
}

/// An anonymous message at midnight. Stored under `midnight`.
pub fn midnight() -> Result<StoryGraph, GraphError> {
    StoryGraph::from_nodes([
        branch(
            "start",
            "Es medianoche en la ciudad. Un mensaje anónimo llega a tu teléfono: 'Si quieres la verdad, ve al muelle 14'.",
            ("Ir al muelle 14", "dock1"),
            ("Ignorar el mensaje y quedarte en casa", "home1"),
        ),
        branch(
            "dock1",
            "El muelle está desierto, salvo por un maletín apoyado contra una farola parpadeante.",
            ("Abrir el maletín", "dock2A"),
            ("Observar desde la distancia", "dock2B"),
        ),
        branch(
            "home1",
            "Intentas dormir, pero escuchas pasos afuera. Alguien toca la puerta tres veces.",
            ("Abrir la puerta", "home2A"),
            ("Mirar por la mirilla", "home2B"),
        ),
        branch(
            "dock2A",
            "Dentro hay fotos tuyas vigilándote durante semanas. Un sobre tiene la dirección de un almacén.",
            ("Ir al almacén", "finalA1"),
            ("Quemar las pruebas", "finalA2"),
        ),
        branch(
            "dock2B",
            "Ves a un hombre con sombrero acercarse. Susurra tu nombre y desaparece en la niebla.",
            ("Seguirlo", "finalB1"),
            ("Quedarte quieto", "finalB2"),
        ),
        branch(
            "home2A",
            "Un desconocido empapado te entrega una llave antigua y se marcha sin decir palabra.",
            ("Probar la llave en tu casa", "finalC1"),
            ("Guardarla para más tarde", "finalC2"),
        ),
        branch(
            "home2B",
            "Por la mirilla ves un sobre rojo. Dentro, una foto tuya en el muelle 14.",
            ("Ir al muelle", "finalD1"),
            ("Llamar a la policía", "finalD2"),
        ),
        StoryNode::ending(
            "finalA1",
            "El almacén revela un centro de vigilancia clandestino. Tu nombre está en la lista. Fin.",
        ),
        StoryNode::ending(
            "finalA2",
            "Quemaste el maletín, pero una sombra te observa desde un tejado. Fin.",
        ),
        StoryNode::ending(
            "finalB1",
            "Lo sigues hasta un túnel donde desaparece frente a tus ojos. Fin.",
        ),
        StoryNode::ending(
            "finalB2",
            "La figura se esfuma y quedas con más preguntas que respuestas. Fin.",
        ),
        StoryNode::ending(
            "finalC1",
            "La llave abre una puerta secreta en tu sótano. Dentro, cajas con archivos de tu vida. Fin.",
        ),
        StoryNode::ending(
            "finalC2",
            "Guardas la llave, pero al día siguiente ha desaparecido. Fin.",
        ),
        StoryNode::ending(
            "finalD1",
            "El muelle está vacío, salvo por un teléfono que empieza a sonar. Fin.",
        ),
        StoryNode::ending(
            "finalD2",
            "La policía llega, pero no encuentra nada. Solo queda el sobre rojo. Fin.",
        ),
    ])
}

/// Waking up on a silent spaceship. Stored under `spaceship`.
pub fn spaceship() -> Result<StoryGraph, GraphError> {
    StoryGraph::from_nodes([
        branch(
            "start",
            "Despiertas en una cápsula criogénica. La nave está en silencio, pero una luz roja parpadea en el panel de mando.",
            ("Revisar el panel de mando", "panel1"),
            ("Explorar el pasillo principal", "hall1"),
        ),
        branch(
            "panel1",
            "El panel muestra una alerta: 'Fuga de oxígeno en el sector 7'.",
            ("Sellar el sector 7", "panel2A"),
            ("Ignorar y buscar a la tripulación", "panel2B"),
        ),
        branch(
            "hall1",
            "Caminas por el pasillo y encuentras un robot de servicio bloqueando el camino.",
            ("Hablar con el robot", "hall2A"),
            ("Buscar un atajo", "hall2B"),
        ),
        branch(
            "panel2A",
            "Sellas el sector, pero detectas movimiento no identificado en el hangar.",
            ("Ir al hangar", "finalA1"),
            ("Asegurar la cabina de mando", "finalA2"),
        ),
        branch(
            "panel2B",
            "No encuentras a nadie, pero oyes pasos metálicos acercándose.",
            ("Esconderte", "finalB1"),
            ("Enfrentarte a lo que sea", "finalB2"),
        ),
        branch(
            "hall2A",
            "El robot dice: 'Acceso restringido. Autorízate'.",
            ("Dar código de capitán", "finalC1"),
            ("Hackear al robot", "finalC2"),
        ),
        branch(
            "hall2B",
            "Encuentras una compuerta de mantenimiento abierta, pero escuchas ruidos adentro.",
            ("Entrar", "finalD1"),
            ("Buscar otra ruta", "finalD2"),
        ),
        StoryNode::ending(
            "finalA1",
            "En el hangar descubres una nave alienígena acoplada. Fin.",
        ),
        StoryNode::ending(
            "finalA2",
            "Aseguras la cabina, pero quedas atrapado en ella. Fin.",
        ),
        StoryNode::ending(
            "finalB1",
            "Te escondes, pero algo te encuentra. Fin.",
        ),
        StoryNode::ending(
            "finalB2",
            "Te enfrentas a un dron de seguridad fuera de control. Fin.",
        ),
        StoryNode::ending(
            "finalC1",
            "El robot te reconoce como capitán y te escolta. Fin.",
        ),
        StoryNode::ending(
            "finalC2",
            "Hackeas al robot, pero activa una alarma. Fin.",
        ),
        StoryNode::ending(
            "finalD1",
            "Dentro hay un alienígena herido pidiendo ayuda. Fin.",
        ),
        StoryNode::ending(
            "finalD2",
            "Encuentras una salida que lleva a la bodega. Fin.",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_stories_are_complete() {
        for (meta, graph) in all().unwrap() {
            assert!(graph.contains("start"), "{} has no start", meta.story_key);
            assert!(
                graph.dangling_references().is_empty(),
                "{} has dangling choices",
                meta.story_key
            );
            assert!(graph.nodes().any(|n| n.is_terminal()));
        }
    }

    #[test]
    fn test_leon_raton_shape() {
        let graph = leon_raton().unwrap();
        assert_eq!(graph.len(), 7);
        assert!(graph.get("finalFree").unwrap().is_terminal());
        assert!(graph.get("finalEat").unwrap().is_terminal());
        assert_eq!(graph.get("start").unwrap().choice(1).unwrap().next_id, "letGo");
    }

    #[test]
    fn test_branching_stories_have_eight_endings() {
        for graph in [forest().unwrap(), midnight().unwrap(), spaceship().unwrap()] {
            assert_eq!(graph.len(), 15);
            assert_eq!(graph.nodes().filter(|n| n.is_terminal()).count(), 8);
        }
    }
}
