//! Failure Tracker: counts row errors against the run's threshold.

use crate::api::logs::RunLog;
use crate::error::{PipelineError, RowError};

/// Per-run row-error counter.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    max_allowed: usize,
    count: usize,
}

impl FailureTracker {
    pub fn new(max_allowed: usize) -> Self {
        Self { max_allowed, count: 0 }
    }

    /// Count the error and log it as one `ERROR` line.
    pub fn record(&mut self, error: &RowError, log: &mut RunLog) {
        self.count += 1;
        log.error(error.to_string());
    }

    /// True once the count strictly exceeds the threshold.
    pub fn exceeded(&self) -> bool {
        self.count > self.max_allowed
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Threshold error for the current count.
    pub fn limit_error(&self) -> PipelineError {
        PipelineError::FailureLimit {
            failures: self.count,
            max_allowed: self.max_allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::logs::LogLevel;

    #[test]
    fn test_exceeded_is_strict() {
        let mut log = RunLog::new();
        let mut tracker = FailureTracker::new(1);
        let err = RowError::new("transactions.csv", 3, "bad value");

        tracker.record(&err, &mut log);
        assert!(!tracker.exceeded());

        tracker.record(&err, &mut log);
        assert!(tracker.exceeded());
        assert_eq!(tracker.count(), 2);
        assert_eq!(log.count(LogLevel::Error), 2);
        assert_eq!(log.lines()[0], "ERROR: [transactions.csv] Row 3: bad value");
    }

    #[test]
    fn test_zero_threshold() {
        let mut tracker = FailureTracker::new(0);
        assert!(!tracker.exceeded());
        tracker.record(&RowError::new("a.csv", 2, "x"), &mut RunLog::new());
        assert!(tracker.exceeded());
        assert!(tracker.limit_error().to_string().contains("max allowed 0"));
    }
}
