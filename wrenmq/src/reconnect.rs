use std::time::{Duration, Instant};

use rand::Rng;

/// Automatic reconnect behaviour of the event loop.
///
/// Disabled by default, in which case a connection error is returned to the
/// caller of [`EventLoop::poll`](crate::EventLoop::poll) instead of retried.
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    pub(crate) enabled: bool,
    pub(crate) min_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) multiplier: f64,
    pub(crate) jitter: f64,
    pub(crate) stability_threshold: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        ReconnectOptions {
            enabled: false,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
            jitter: 0.5,
            stability_threshold: Duration::from_secs(30),
        }
    }
}

impl ReconnectOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The delay before the first reconnect attempt, and the lower bound
    /// the backoff resets to after a stable connection.
    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Upper bound on the backoff delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor applied to the delay after every failed attempt.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Fraction of the delay that is randomized, between 0 and 1.
    /// A jitter of 0.5 sleeps between half the delay and the full delay.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// How long a connection must last for the backoff to reset to
    /// the minimum delay.
    pub fn stability_threshold(mut self, threshold: Duration) -> Self {
        self.stability_threshold = threshold;
        self
    }
}

/// Tracks the current backoff delay across connection attempts.
#[derive(Debug)]
pub(crate) struct Backoff {
    options: ReconnectOptions,
    current: Duration,
    connected_at: Option<Instant>,
}

impl Backoff {
    pub fn new(options: ReconnectOptions) -> Self {
        let current = options.min_delay;
        Backoff {
            options,
            current,
            connected_at: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.options.enabled
    }

    /// The delay to sleep before the next attempt. Grows the base delay
    /// for the attempt after this one.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let grown = self.current.as_secs_f64() * self.options.multiplier;
        self.current = Duration::from_secs_f64(grown).min(self.options.max_delay);

        if self.options.jitter == 0.0 {
            return base;
        }
        let low = base.as_secs_f64() * (1.0 - self.options.jitter);
        let picked = rand::thread_rng().gen_range(low..=base.as_secs_f64());
        Duration::from_secs_f64(picked)
    }

    pub fn note_connected(&mut self) {
        self.connected_at = Some(Instant::now());
    }

    /// Resets the delay to the minimum when the previous connection
    /// lasted long enough to count as stable.
    pub fn note_disconnected(&mut self) {
        if let Some(connected_at) = self.connected_at.take() {
            if connected_at.elapsed() >= self.options.stability_threshold {
                self.current = self.options.min_delay;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn options() -> ReconnectOptions {
        ReconnectOptions::default()
            .enabled(true)
            .min_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(8))
            .multiplier(2.0)
            .jitter(0.0)
    }

    #[test]
    fn delay_doubles_until_the_cap() {
        let mut backoff = Backoff::new(options());
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn jitter_stays_within_the_window() {
        let mut backoff = Backoff::new(options().jitter(0.5));
        // burn the first two attempts so the base delay is 4s
        backoff.next_delay();
        backoff.next_delay();
        for _ in 0..50 {
            backoff.current = Duration::from_secs(4);
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(2), "delay {delay:?} below window");
            assert!(delay <= Duration::from_secs(4), "delay {delay:?} above window");
        }
    }

    #[test]
    fn short_lived_connection_keeps_the_grown_delay() {
        let mut backoff = Backoff::new(options());
        backoff.next_delay();
        backoff.next_delay();

        backoff.note_connected();
        backoff.note_disconnected();
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn stable_connection_resets_the_delay() {
        let mut backoff = Backoff::new(options().stability_threshold(Duration::ZERO));
        backoff.next_delay();
        backoff.next_delay();

        backoff.note_connected();
        backoff.note_disconnected();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
