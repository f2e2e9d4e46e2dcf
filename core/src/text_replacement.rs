//! Detection of the OS's own text replacement.
//!
//! When a system text-replacement shortcut fires, the OS deletes the typed
//! shortcut with a burst of Delete key events and then inserts the expansion
//! followed by a Space. That Space reaches the tap looking like a user key.
//! Processing it would double the output, so a bare Space seen shortly after
//! a delete burst is passed through instead.

use serde::Serialize;

/// Outcome of [`ExternalDeleteTracker::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum TextReplacementDecision {
    /// Deletes were observed `elapsed_ms` ago.
    ExternalDelete { elapsed_ms: u64, delete_count: u32 },
    NoMatch,
}

impl TextReplacementDecision {
    pub fn should_bypass(self) -> bool {
        matches!(self, TextReplacementDecision::ExternalDelete { .. })
    }
}

/// Delete keys that reached the tap from outside the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExternalDeleteTracker {
    count: u32,
    last_delete_ms: Option<u64>,
    detected: bool,
}

impl ExternalDeleteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a Delete key-down. A gap longer than `reset_after_ms` starts a
    /// new burst.
    pub fn record(&mut self, now_ms: u64, reset_after_ms: u64) {
        if let Some(last) = self.last_delete_ms {
            if now_ms.saturating_sub(last) > reset_after_ms {
                self.count = 0;
            }
        }
        self.last_delete_ms = Some(now_ms);
        self.count += 1;
        self.detected = true;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn evaluate(&self, now_ms: u64, window_ms: u64) -> TextReplacementDecision {
        match self.last_delete_ms {
            Some(last) if self.detected && self.count > 0 => {
                let elapsed_ms = now_ms.saturating_sub(last);
                if elapsed_ms < window_ms {
                    TextReplacementDecision::ExternalDelete {
                        elapsed_ms,
                        delete_count: self.count,
                    }
                } else {
                    TextReplacementDecision::NoMatch
                }
            }
            _ => TextReplacementDecision::NoMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_deletes_no_match() {
        let tracker = ExternalDeleteTracker::new();
        assert_eq!(tracker.evaluate(1_000, 30_000), TextReplacementDecision::NoMatch);
    }

    #[test]
    fn test_recent_burst_matches() {
        let mut tracker = ExternalDeleteTracker::new();
        tracker.record(1_000, 30_000);
        tracker.record(1_010, 30_000);
        let decision = tracker.evaluate(1_500, 30_000);
        assert_eq!(
            decision,
            TextReplacementDecision::ExternalDelete {
                elapsed_ms: 490,
                delete_count: 2
            }
        );
        assert!(decision.should_bypass());
        assert!(!tracker.evaluate(31_010, 30_000).should_bypass());
    }

    #[test]
    fn test_long_gap_restarts_count() {
        let mut tracker = ExternalDeleteTracker::new();
        tracker.record(0, 30_000);
        tracker.record(10, 30_000);
        tracker.record(40_000, 30_000);
        assert_eq!(tracker.count(), 1);
        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert!(!tracker.evaluate(40_001, 30_000).should_bypass());
    }
}
