use std::time::Duration;

/// Polling period for one monitor, stretched under throttling.
///
/// `ceiling` bounds the throttled period so safety-critical polling never slows
/// past it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    base: Duration,
    backoff: f64,
    ceiling: Option<Duration>,
}

impl Cadence {
    pub fn new(base: Duration, backoff: f64) -> Self {
        Self { base, backoff: backoff.max(1.0), ceiling: None }
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn period(&self, throttled: bool) -> Duration {
        if !throttled {
            return self.base;
        }
        let stretched = self.base.mul_f64(self.backoff);
        match self.ceiling {
            // Never faster than base even if the ceiling is misconfigured.
            Some(ceiling) => stretched.min(ceiling).max(self.base),
            None => stretched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_period_is_capped() {
        let cadence = Cadence::new(Duration::from_millis(100), 4.0)
            .with_ceiling(Duration::from_millis(250));
        assert_eq!(cadence.period(false), Duration::from_millis(100));
        assert_eq!(cadence.period(true), Duration::from_millis(250));
    }

    #[test]
    fn backoff_below_one_is_clamped() {
        let cadence = Cadence::new(Duration::from_millis(200), 0.25);
        assert_eq!(cadence.period(true), Duration::from_millis(200));
    }
}
