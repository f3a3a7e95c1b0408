//! Newest-result cell read by the render thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Holds the most recent output as a shared reference.
///
/// Storing swaps the reference; readers keep whatever they loaded alive for as
/// long as they need it.
#[derive(Debug)]
pub struct LatestOutput<T> {
    inner: Mutex<(u64, Option<Arc<T>>)>,
}

impl<T> Default for LatestOutput<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new((0, None)),
        }
    }
}

impl<T> LatestOutput<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, (u64, Option<Arc<T>>)> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current value. Returns the new generation.
    pub fn store(&self, value: Arc<T>) -> u64 {
        let mut guard = self.lock();
        guard.0 += 1;
        guard.1 = Some(value);
        guard.0
    }

    pub fn load(&self) -> Option<Arc<T>> {
        self.lock().1.clone()
    }

    /// The current value if its generation is newer than `seen`.
    pub fn load_if_newer(&self, seen: u64) -> Option<(u64, Arc<T>)> {
        let guard = self.lock();
        if guard.0 > seen {
            guard.1.clone().map(|v| (guard.0, v))
        } else {
            None
        }
    }

    pub fn generation(&self) -> u64 {
        self.lock().0
    }
}
