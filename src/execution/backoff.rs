use std::time::Duration;

/// Fixed, non-decreasing delay schedule for order confirmation.
///
/// One attempt per entry; the delay at index `i` is slept between attempt
/// `i` and attempt `i + 1`, so the final entry bounds the schedule but is
/// never slept.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_millis(&[500, 500, 500, 1000, 1000, 1000, 2000, 2000, 2000, 2000])
    }
}

impl BackoffSchedule {
    /// Build from millisecond delays.
    ///
    /// A delay shorter than its predecessor is raised to it, and an empty
    /// list yields a single attempt.
    pub fn from_millis(millis: &[u64]) -> Self {
        let mut floor = 0;
        let mut delays: Vec<Duration> = millis
            .iter()
            .map(|&ms| {
                floor = floor.max(ms);
                Duration::from_millis(floor)
            })
            .collect();
        if delays.is_empty() {
            delays.push(Duration::ZERO);
        }
        Self { delays }
    }

    pub fn attempts(&self) -> usize {
        self.delays.len()
    }

    /// Delay after a non-final attempt, None after the last one
    pub fn delay_before_retry(&self, attempt: usize) -> Option<Duration> {
        if attempt + 1 < self.delays.len() {
            self.delays.get(attempt).copied()
        } else {
            None
        }
    }

    /// Longest total time spent sleeping
    pub fn total_wait(&self) -> Duration {
        (0..self.attempts())
            .filter_map(|i| self.delay_before_retry(i))
            .sum()
    }
}
