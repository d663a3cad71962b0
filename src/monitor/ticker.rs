//! Poll pacing for the convergence monitor.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default polling period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Source of poll instants. Separated out so tests can drive the monitor
/// under paused tokio time.
#[allow(async_fn_in_trait)]
pub trait Ticker {
    /// Wait until the next poll is due.
    async fn tick(&mut self);

    fn period(&self) -> Duration;
}

/// `tokio::time::interval` ticker. The first tick completes one period after
/// construction, not immediately.
pub struct IntervalTicker {
    interval: Interval,
    period: Duration,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        // A slow remote query must not be followed by a burst of catch-up polls.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalTicker { interval, period }
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }

    fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_one_period() {
        let start = Instant::now();
        let mut ticker = IntervalTicker::new(Duration::from_secs(1));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
