use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Optional wall-clock cutoff threaded through every suspension point of a
/// deployment run. A default `Deadline` never expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn after(duration: Duration) -> Self {
        Deadline(Some(Instant::now() + duration))
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        match timeout {
            Some(d) => Deadline::after(d),
            None => Deadline::none(),
        }
    }

    /// Time left before the cutoff. `None` means unbounded; a zero duration
    /// means the deadline has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    /// Error out if the cutoff has passed, naming the operation in flight.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.expired() {
            Err(Error::deploy_timeout(what))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let d = Deadline::none();
        assert!(!d.expired());
        assert!(d.remaining().is_none());
        assert!(d.check("anything").is_ok());
    }

    #[test]
    fn passed_deadline_reports_timeout() {
        let d = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(d.expired());
        let err = d.check("waiting for app").unwrap_err();
        assert_eq!(err.code.as_str(), "deploy.timeout");
    }
}
