//! Status and parser state polling bookkeeping
//!
//! At most one status query and one parser state query are outstanding at a
//! time. A query that has gone unanswered for longer than its tolerance is
//! considered lost and may be issued again.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Outstanding {
    pending: bool,
    sent_at: Option<Instant>,
}

impl Outstanding {
    /// Claim the slot if it is free or stale
    fn claim(&mut self, now: Instant, tolerance: Duration, what: &str) -> bool {
        if self.pending {
            let stale = self
                .sent_at
                .is_none_or(|sent| now.saturating_duration_since(sent) >= tolerance);
            if !stale {
                return false;
            }
            tracing::debug!("{} query unanswered for {:?}, re-issuing", what, tolerance);
        }
        self.pending = true;
        self.sent_at = Some(now);
        true
    }

    fn release(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }
}

#[derive(Debug, Clone)]
pub struct Polling {
    status: Outstanding,
    parser_state: Outstanding,
    status_tolerance: Duration,
    parser_state_tolerance: Duration,
}

impl Polling {
    pub fn new(status_tolerance: Duration, parser_state_tolerance: Duration) -> Self {
        Self {
            status: Outstanding::default(),
            parser_state: Outstanding::default(),
            status_tolerance,
            parser_state_tolerance,
        }
    }

    /// True when a status query should be written now
    pub fn query_status(&mut self, now: Instant) -> bool {
        self.status.claim(now, self.status_tolerance, "Status")
    }

    /// True when a parser state query should be written now
    pub fn query_parser_state(&mut self, now: Instant) -> bool {
        self.parser_state
            .claim(now, self.parser_state_tolerance, "Parser state")
    }

    /// A status report arrived; returns whether one was outstanding
    pub fn status_received(&mut self) -> bool {
        self.status.release()
    }

    pub fn parser_state_received(&mut self) -> bool {
        self.parser_state.release()
    }

    pub fn reset(&mut self) {
        self.status = Outstanding::default();
        self.parser_state = Outstanding::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_outstanding_query() {
        let mut polling = Polling::new(Duration::from_secs(5), Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(polling.query_status(t0));
        assert!(!polling.query_status(t0 + Duration::from_millis(250)));
        assert!(polling.status_received());
        assert!(polling.query_status(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_stale_query_is_reissued() {
        let mut polling = Polling::new(Duration::from_secs(5), Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(polling.query_parser_state(t0));
        assert!(!polling.query_parser_state(t0 + Duration::from_secs(9)));
        assert!(polling.query_parser_state(t0 + Duration::from_secs(10)));
    }
}
