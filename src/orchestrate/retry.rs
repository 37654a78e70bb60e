//! Bounded exponential backoff with downward jitter.

// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, policy::RetryPolicy};

/// Tracks one chunk's retry budget and computes its backoff delays.
///
/// Delays follow `min(max_delay, initial_delay * multiplier^attempt)` with jitter
/// applied downward only, so the documented formula stays an upper bound.
#[derive(Clone, Debug)]
pub struct RetrySchedule {
	policy: RetryPolicy,
	attempt: u32,
}
impl RetrySchedule {
	/// Creates a fresh schedule with the full retry budget.
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy, attempt: 0 }
	}

	/// Consumes one retry attempt and returns the delay to sleep before it, or
	/// `None` when the budget is exhausted.
	pub fn next_delay(&mut self) -> Option<Duration> {
		if !self.try_consume() {
			return None;
		}

		let exponential = self.policy.initial_delay.as_secs_f64()
			* self.policy.backoff_multiplier.powi(self.attempt as i32 - 1);
		let capped = exponential.min(self.policy.max_delay.as_secs_f64());
		let jittered = capped * rand::rng().random_range(0.8..=1.0);

		Some(Duration::from_secs_f64(jittered))
	}

	/// Consumes one retry attempt without computing a delay.
	///
	/// Quota-exhausted retries wait out the cooldown instead of a backoff delay but
	/// still spend the budget, so a provider stuck signalling exhaustion cannot pin
	/// a chunk forever.
	pub fn try_consume(&mut self) -> bool {
		if self.attempt >= self.policy.max_retries {
			return false;
		}

		self.attempt += 1;

		true
	}

	/// Attempts consumed so far.
	pub fn attempts_used(&self) -> u32 {
		self.attempt
	}
}
