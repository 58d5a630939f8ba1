//! Character-by-character text reveal.
//!
//! [`Typewriter`] is the pure reveal state: it knows how much of a text is
//! visible and advances one character per [`tick`](Typewriter::tick).
//! [`RevealTimer`] is the single timer handle that paces those ticks.
//!
//! Every reveal run gets a generation number. A tick carries the generation
//! it was scheduled for, and ticks from an older run are ignored, so a timer
//! that fires after its run was cancelled can never touch the new text.

use std::time::Duration;
use tokio::time::Instant;

/// Default delay between revealed characters.
pub const DEFAULT_TYPING_INTERVAL: Duration = Duration::from_millis(18);

/// Outcome of a single [`Typewriter::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The tick belonged to a cancelled or superseded run.
    Stale,
    /// No reveal is in progress.
    Idle,
    /// One more character became visible.
    Advanced(String),
    /// The last character became visible; the reveal is over.
    Completed(String),
}

/// Incremental reveal state for one text.
#[derive(Debug, Clone, Default)]
pub struct Typewriter {
    text: String,
    /// Byte offset of the end of the visible prefix (always a char boundary).
    visible: usize,
    revealing: bool,
    generation: u64,
}

impl Typewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin revealing `text` from nothing, superseding any run in progress.
    ///
    /// Returns the generation of the new run. Empty text is complete at once.
    pub fn start(&mut self, text: impl Into<String>) -> u64 {
        self.generation += 1;
        self.text = text.into();
        self.visible = 0;
        self.revealing = !self.text.is_empty();
        self.generation
    }

    /// Reveal the next character if `generation` is the current run.
    pub fn tick(&mut self, generation: u64) -> Tick {
        if generation != self.generation {
            return Tick::Stale;
        }
        if !self.revealing {
            return Tick::Idle;
        }

        let Some(next) = self.text[self.visible..].chars().next() else {
            self.revealing = false;
            return Tick::Completed(String::new());
        };

        self.visible += next.len_utf8();
        if self.visible == self.text.len() {
            self.revealing = false;
            Tick::Completed(next.to_string())
        } else {
            Tick::Advanced(next.to_string())
        }
    }

    /// Show the whole text immediately.
    ///
    /// Returns the part that was still hidden, or `None` when no reveal was in
    /// progress.
    pub fn skip(&mut self) -> Option<String> {
        if !self.revealing {
            return None;
        }
        let rest = self.text[self.visible..].to_string();
        self.visible = self.text.len();
        self.revealing = false;
        Some(rest)
    }

    /// Stop the current run where it is. Any tick already scheduled for it
    /// becomes stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.revealing = false;
    }

    pub fn is_revealing(&self) -> bool {
        self.revealing
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The currently visible prefix.
    pub fn revealed(&self) -> &str {
        &self.text[..self.visible]
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Visible and total length, in characters.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.revealed().chars().count(),
            self.text.chars().count(),
        )
    }
}

/// The one timer that paces a reveal run.
///
/// `start` and `cancel` are its only entry points. Starting always replaces
/// the previous schedule, so two runs can never interleave.
#[derive(Debug)]
pub struct RevealTimer {
    period: Duration,
    armed: Option<Armed>,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    generation: u64,
    next: Instant,
}

impl RevealTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            armed: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Schedule ticks for `generation`, one period from now.
    pub fn start(&mut self, generation: u64) {
        self.armed = Some(Armed {
            generation,
            next: Instant::now() + self.period,
        });
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Wait for the next tick and return the generation it belongs to.
    ///
    /// Never resolves while the timer is cancelled. Dropping the future
    /// before it resolves leaves the schedule untouched.
    pub async fn fire(&mut self) -> u64 {
        let Some(armed) = self.armed else {
            return std::future::pending().await;
        };

        tokio::time::sleep_until(armed.next).await;

        if let Some(current) = self.armed.as_mut() {
            current.next = Instant::now() + self.period;
        }
        armed.generation
    }
}
