//! Deadline propagation for blocking calls

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Carries an optional deadline through every network and exec call.
///
/// Components never invent their own overall timeout; they only honour the
/// one the caller put here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// A context without deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with [`Error::DeadlineExceeded`] if the deadline has passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(Error::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// A child context whose deadline is the earlier of this one and
    /// `now + limit`.
    pub fn bounded(&self, limit: Duration) -> Self {
        let candidate = Instant::now().checked_add(limit);
        let deadline = match (self.deadline, candidate) {
            (Some(current), Some(candidate)) => Some(current.min(candidate)),
            (current, candidate) => current.or(candidate),
        };
        Self { deadline }
    }
}
