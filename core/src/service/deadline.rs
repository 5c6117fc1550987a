use crate::error::{Result, RetinaError};
use std::time::{Duration, Instant};

/// Optional point in time after which a request stops making progress
///
/// Checked between pipeline stages only. A network that has started
/// running is never interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Expires `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Builds a deadline from an optional millisecond budget
    pub fn from_millis(timeout_ms: Option<u64>) -> Self {
        timeout_ms
            .map(|ms| Self::after(Duration::from_millis(ms)))
            .unwrap_or_default()
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Fails with [`RetinaError::DeadlineExceeded`] naming `stage` once expired
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_expired() {
            return Err(RetinaError::DeadlineExceeded { stage });
        }
        Ok(())
    }
}
