//! Per-user storage of finished playthroughs.
//!
//! Each user has one list of [`PlaythroughSummary`] values, most recent
//! first, capped at [`MAX_PLAYED_STORIES`]. Backends only implement
//! load/save/delete of the whole list; the list operations are provided.

use crate::recorder::PlaythroughSummary;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Most recent playthroughs kept per user.
pub const MAX_PLAYED_STORIES: usize = 50;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Storage key derived from a user identifier.
///
/// Anything that is not alphanumeric becomes `_`, so the key is safe as a
/// file name or key-value store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey(String);

impl UserKey {
    pub fn new(user: &str) -> Self {
        let sanitized: String = user
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        if sanitized.is_empty() {
            Self::guest()
        } else {
            Self(sanitized)
        }
    }

    /// Key used when nobody is signed in.
    pub fn guest() -> Self {
        Self("guest".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key under which the user's list is stored.
    pub fn storage_key(&self) -> String {
        format!("playedStories_{}", self.0)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An in-place change to one user's list.
pub type ListEdit = Box<dyn FnOnce(&mut Vec<PlaythroughSummary>) + Send>;

/// Storage for finished playthroughs.
#[async_trait]
pub trait PlayedStoryStore: Send + Sync {
    /// Read the user's whole list.
    async fn load(&self, user: &UserKey) -> Result<Vec<PlaythroughSummary>, StoreError>;

    /// Replace the user's whole list.
    async fn save(&self, user: &UserKey, list: &[PlaythroughSummary]) -> Result<(), StoreError>;

    /// Forget the user's list.
    async fn delete(&self, user: &UserKey) -> Result<(), StoreError>;

    /// Most playthroughs kept per user.
    fn capacity(&self) -> usize {
        MAX_PLAYED_STORIES
    }

    /// Load the user's list, apply `edit` and store the result.
    ///
    /// Backends that can be written concurrently override this so no other
    /// update runs between the load and the save.
    async fn update(&self, user: &UserKey, edit: ListEdit) -> Result<Vec<PlaythroughSummary>, StoreError> {
        let mut list = self.load(user).await?;
        edit(&mut list);
        self.save(user, &list).await?;
        Ok(list)
    }

    /// All playthroughs, most recent first.
    async fn list(&self, user: &UserKey) -> Result<Vec<PlaythroughSummary>, StoreError> {
        self.load(user).await
    }

    /// Record a new playthrough at the front, dropping the oldest past the cap.
    async fn add(&self, user: &UserKey, summary: PlaythroughSummary) -> Result<(), StoreError> {
        let capacity = self.capacity();
        self.update(
            user,
            Box::new(move |list| {
                list.insert(0, summary);
                list.truncate(capacity);
            }),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, user: &UserKey, id: &str) -> Result<Option<PlaythroughSummary>, StoreError> {
        Ok(self.load(user).await?.into_iter().find(|s| s.id == id))
    }

    /// Remove one playthrough and return the remaining list.
    async fn remove(&self, user: &UserKey, id: &str) -> Result<Vec<PlaythroughSummary>, StoreError> {
        let id = id.to_string();
        self.update(user, Box::new(move |list| list.retain(|s| s.id != id)))
            .await
    }

    async fn clear(&self, user: &UserKey) -> Result<(), StoreError> {
        self.delete(user).await
    }
}

/// Keeps each user's list in a JSON file under a directory.
///
/// Clones share one write lock, so updates through any clone are serialized.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    capacity: usize,
    writes: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            capacity: MAX_PLAYED_STORIES,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// File holding `user`'s list.
    pub fn path_for(&self, user: &UserKey) -> PathBuf {
        self.dir.join(format!("{}.json", user.storage_key()))
    }
}

#[async_trait]
impl PlayedStoryStore for FileStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn load(&self, user: &UserKey) -> Result<Vec<PlaythroughSummary>, StoreError> {
        let path = self.path_for(user);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // A corrupt list reads as empty rather than locking the user out.
        match serde_json::from_str(&content) {
            Ok(list) => Ok(list),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable played stories");
                Ok(Vec::new())
            }
        }
    }

    async fn update(&self, user: &UserKey, edit: ListEdit) -> Result<Vec<PlaythroughSummary>, StoreError> {
        let _guard = self.writes.lock().await;
        let mut list = self.load(user).await?;
        edit(&mut list);
        self.save(user, &list).await?;
        Ok(list)
    }

    async fn save(&self, user: &UserKey, list: &[PlaythroughSummary]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(list)?;

        // Write aside, then rename over the list.
        let path = self.path_for(user);
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", user.storage_key(), uuid::Uuid::new_v4()));
        fs::write(&staging, content).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            fs::remove_file(&staging).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, user: &UserKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(user)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Keeps lists in memory. Used for guests and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: RwLock<HashMap<UserKey, Vec<PlaythroughSummary>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlayedStoryStore for MemoryStore {
    async fn load(&self, user: &UserKey) -> Result<Vec<PlaythroughSummary>, StoreError> {
        Ok(self.lists.read().await.get(user).cloned().unwrap_or_default())
    }

    async fn save(&self, user: &UserKey, list: &[PlaythroughSummary]) -> Result<(), StoreError> {
        self.lists.write().await.insert(user.clone(), list.to_vec());
        Ok(())
    }

    async fn update(&self, user: &UserKey, edit: ListEdit) -> Result<Vec<PlaythroughSummary>, StoreError> {
        let mut lists = self.lists.write().await;
        let list = lists.entry(user.clone()).or_default();
        edit(list);
        Ok(list.clone())
    }

    async fn delete(&self, user: &UserKey) -> Result<(), StoreError> {
        self.lists.write().await.remove(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary(id: &str) -> PlaythroughSummary {
        PlaythroughSummary {
            id: id.to_string(),
            story_key: "forest".to_string(),
            title: "El bosque".to_string(),
            image: None,
            finished_at_iso: "2025-01-01T00:00:00+00:00".to_string(),
            progress: 100,
            decisions: vec!["Tomar el sendero izquierdo".to_string()],
            ending_id: "finalA1".to_string(),
            ending_text: "Fin.".to_string(),
        }
    }

    #[test]
    fn test_user_key_sanitized() {
        let key = UserKey::new("ana.maria@example.com");
        assert_eq!(key.as_str(), "ana_maria_example_com");
        assert_eq!(key.storage_key(), "playedStories_ana_maria_example_com");
        assert_eq!(UserKey::new(""), UserKey::guest());
    }

    #[tokio::test]
    async fn test_add_prepends_and_caps() {
        let store = MemoryStore::new();
        let user = UserKey::new("ana");

        for i in 0..(MAX_PLAYED_STORIES + 5) {
            store.add(&user, summary(&i.to_string())).await.unwrap();
        }

        let list = store.list(&user).await.unwrap();
        assert_eq!(list.len(), MAX_PLAYED_STORIES);
        assert_eq!(list[0].id, (MAX_PLAYED_STORIES + 4).to_string());
        assert_eq!(list.last().unwrap().id, "5");
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = MemoryStore::new();
        store.add(&UserKey::new("ana"), summary("a")).await.unwrap();

        assert!(store.list(&UserKey::new("luis")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_remove_clear() {
        let store = MemoryStore::new();
        let user = UserKey::new("ana");
        store.add(&user, summary("a")).await.unwrap();
        store.add(&user, summary("b")).await.unwrap();

        assert_eq!(store.get(&user, "a").await.unwrap().unwrap().id, "a");
        assert!(store.get(&user, "zzz").await.unwrap().is_none());

        let remaining = store.remove(&user, "a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");

        store.clear(&user).await.unwrap();
        assert!(store.list(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path().join("played"));
        let user = UserKey::new("ana@example.com");

        store.add(&user, summary("a")).await.unwrap();
        store.add(&user, summary("b")).await.unwrap();

        assert!(store.path_for(&user).exists());
        let loaded = FileStore::new(temp_dir.path().join("played"))
            .list(&user)
            .await
            .unwrap();
        let ids: Vec<_> = loaded.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_file_store_missing_and_corrupt() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let user = UserKey::new("ana");

        assert!(store.list(&user).await.unwrap().is_empty());

        std::fs::write(store.path_for(&user), "{not json").unwrap();
        assert!(store.list(&user).await.unwrap().is_empty());

        store.clear(&user).await.unwrap();
        store.clear(&user).await.unwrap();
        assert!(!store.path_for(&user).exists());
    }

    #[tokio::test]
    async fn test_file_store_capacity() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path()).with_capacity(2);
        let user = UserKey::new("ana");

        for id in ["a", "b", "c"] {
            store.add(&user, summary(id)).await.unwrap();
        }

        let ids: Vec<_> = store.list(&user).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    async fn add_concurrently(store: Arc<dyn PlayedStoryStore>, rounds: usize) {
        for round in 0..rounds {
            let user = UserKey::new(&format!("reader{round}"));
            let first = {
                let (store, user) = (Arc::clone(&store), user.clone());
                tokio::spawn(async move { store.add(&user, summary("a")).await })
            };
            let second = {
                let (store, user) = (Arc::clone(&store), user.clone());
                tokio::spawn(async move { store.add(&user, summary("b")).await })
            };
            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();

            let mut ids: Vec<_> = store.list(&user).await.unwrap().into_iter().map(|s| s.id).collect();
            ids.sort();
            assert_eq!(ids, vec!["a", "b"], "round {round} lost a playthrough");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_adds_both_kept() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        add_concurrently(Arc::new(store.clone()), 50).await;

        // No staging files are left behind.
        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_store_concurrent_adds_both_kept() {
        add_concurrently(Arc::new(MemoryStore::new()), 50).await;
    }

    #[tokio::test]
    async fn test_clones_share_write_lock() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path());
        let user = UserKey::new("ana");

        let guard = store.writes.lock().await;
        let clone = store.clone();
        let pending = tokio::spawn(async move { clone.add(&UserKey::new("ana"), summary("a")).await });
        tokio::task::yield_now().await;
        assert!(store.list(&user).await.unwrap().is_empty());

        drop(guard);
        pending.await.unwrap().unwrap();
        assert_eq!(store.list(&user).await.unwrap().len(), 1);
    }
}
