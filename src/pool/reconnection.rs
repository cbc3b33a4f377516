use crate::policies::{ReconnectionPolicy, ReconnectionSchedule};
use std::time::Duration;

/// Reconnection with exponentially growing delays, capped at a maximum.
#[derive(Clone, Debug)]
pub struct ExponentialReconnection {
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for ExponentialReconnection {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ExponentialReconnection {
    /// Creates a policy doubling from `initial_delay` up to `max_delay`.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }
}

impl ReconnectionPolicy for ExponentialReconnection {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            next_delay: self.initial_delay,
            max_delay: self.max_delay,
        })
    }
}

#[derive(Debug)]
struct ExponentialSchedule {
    next_delay: Duration,
    max_delay: Duration,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(self.max_delay);
        delay
    }
}

/// Reconnection attempts in a fixed rhythm.
#[derive(Clone, Debug)]
pub struct ConstantReconnection {
    /// Delay between two attempts.
    pub delay: Duration,
}

impl ReconnectionPolicy for ConstantReconnection {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ConstantSchedule { delay: self.delay })
    }
}

#[derive(Debug)]
struct ConstantSchedule {
    delay: Duration,
}

impl ReconnectionSchedule for ConstantSchedule {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_schedule_doubles_and_caps() {
        let policy =
            ExponentialReconnection::new(Duration::from_millis(100), Duration::from_millis(500));
        let mut schedule = policy.new_schedule();
        assert_eq!(schedule.next_delay(), Duration::from_millis(100));
        assert_eq!(schedule.next_delay(), Duration::from_millis(200));
        assert_eq!(schedule.next_delay(), Duration::from_millis(400));
        assert_eq!(schedule.next_delay(), Duration::from_millis(500));
        assert_eq!(schedule.next_delay(), Duration::from_millis(500));

        // a fresh schedule starts over
        assert_eq!(policy.new_schedule().next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn constant_schedule() {
        let policy = ConstantReconnection {
            delay: Duration::from_secs(3),
        };
        let mut schedule = policy.new_schedule();
        assert_eq!(schedule.next_delay(), Duration::from_secs(3));
        assert_eq!(schedule.next_delay(), Duration::from_secs(3));
    }
}
