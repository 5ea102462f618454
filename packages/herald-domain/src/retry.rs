use std::time::Duration;

use rand::Rng;

const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Bounded exponential backoff shared by the fetch, enrichment, and delivery call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub jitter: bool,
}
impl RetryPolicy {
	pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
		Self { max_attempts: max_attempts.max(1), base_delay, max_delay, jitter }
	}

	/// A policy that makes exactly one attempt.
	pub fn once() -> Self {
		Self::new(1, Duration::ZERO, Duration::ZERO, false)
	}

	/// Whether another attempt is allowed after `attempt` (1-based) failed.
	pub fn should_retry(&self, attempt: u32) -> bool {
		attempt < self.max_attempts
	}

	/// Delay before the attempt following `attempt`, before jitter.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
		let base = self.base_delay.saturating_mul(1 << exp);

		base.min(self.max_delay)
	}

	/// Backoff with equal jitter: half the delay is fixed, the other half random.
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let delay = self.backoff_for_attempt(attempt);

		if !self.jitter || delay.is_zero() {
			return delay;
		}

		let half = delay / 2;
		let spread = rand::thread_rng().gen_range(0..=half.as_millis() as u64);

		half + Duration::from_millis(spread)
	}
}
