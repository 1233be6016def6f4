//! Pure debounce core for free-text search.
//!
//! Timer-free so the supersession and dedup rules are unit-testable without a
//! runtime: [`SearchDebouncer::submit`] hands back a generation token and the
//! quiet-window delay, the caller sleeps, and [`SearchDebouncer::fire`] only
//! releases the query if no newer submission arrived in the meantime and the
//! query differs from the last one actually issued.

use std::time::Duration;

use crate::SEARCH_DEBOUNCE;

/// Opaque handle tying a pending query to the submission that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceToken(u64);

#[derive(Debug)]
pub struct SearchDebouncer {
    window: Duration,
    generation: u64,
    pending: Option<String>,
    last_issued: Option<String>,
}

impl SearchDebouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(SEARCH_DEBOUNCE)
    }

    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            generation: 0,
            pending: None,
            last_issued: None,
        }
    }

    /// Registers a keystroke. Any earlier token becomes stale immediately.
    pub fn submit(&mut self, query: impl Into<String>) -> (DebounceToken, Duration) {
        self.generation += 1;
        self.pending = Some(query.into());
        (DebounceToken(self.generation), self.window)
    }

    /// Called after the quiet window. Returns the query to issue, or `None`
    /// when the token was superseded or the query matches the last one issued.
    pub fn fire(&mut self, token: DebounceToken) -> Option<String> {
        if token.0 != self.generation {
            return None;
        }
        let query = self.pending.take()?;
        if self.last_issued.as_deref() == Some(query.as_str()) {
            return None;
        }
        self.last_issued = Some(query.clone());
        Some(query)
    }

    /// Forgets issued history, e.g. when the view reverts to the filtered
    /// listing and the next identical query must run again.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.last_issued = None;
    }
}

impl Default for SearchDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
