//! Per-operation token-bucket rate limiter with FIFO admission.
//!
//! One bucket per operation key, refilled lazily from elapsed monotonic time and
//! capped at the policy's burst capacity. `acquire` only ever delays—it cannot fail
//! unless the caller's deadline elapses—and waiters are admitted in arrival order.

// self
use crate::{
	_prelude::*,
	key::OperationKey,
	policy::{PolicySet, RatePolicy},
	wait,
};

/// Per-operation token-bucket limiter.
pub struct RateLimiter {
	policies: Arc<PolicySet>,
	buckets: Mutex<HashMap<OperationKey, Arc<Bucket>>>,
}
impl RateLimiter {
	/// Creates a limiter that sizes buckets from the provided policy set.
	pub fn new(policies: Arc<PolicySet>) -> Self {
		Self { policies, buckets: Mutex::new(HashMap::new()) }
	}

	/// Suspends until one permit is granted for `operation`.
	///
	/// The wait is computed from the current shortfall, sliced, and re-evaluated;
	/// `deadline` abandons the wait with [`Error::DeadlineExceeded`].
	pub async fn acquire(
		&self,
		operation: &OperationKey,
		deadline: Option<Instant>,
	) -> Result<()> {
		let bucket = self.bucket(operation);
		// Waiters queue on the admission lock in arrival order, so one caller cannot be
		// served repeatedly while another starves behind it.
		let _first_in_line = bucket.admission.lock().await;

		loop {
			let wait = match bucket.state.lock().try_take() {
				None => return Ok(()),
				Some(wait) => wait,
			};

			wait::sleep_slice("limiter.acquire", wait, deadline).await?;
		}
	}

	/// Returns the current lazily-refilled whole-permit count without blocking.
	pub fn available_tokens(&self, operation: &OperationKey) -> u64 {
		let bucket = self.bucket(operation);
		let mut state = bucket.state.lock();

		state.refill(Instant::now());

		state.tokens as u64
	}

	fn bucket(&self, operation: &OperationKey) -> Arc<Bucket> {
		let mut buckets = self.buckets.lock();

		buckets
			.entry(operation.clone())
			.or_insert_with(|| {
				Arc::new(Bucket::new(&self.policies.policy_for(operation).rate))
			})
			.clone()
	}
}

struct Bucket {
	admission: AsyncMutex<()>,
	state: Mutex<BucketState>,
}
impl Bucket {
	fn new(policy: &RatePolicy) -> Self {
		Self { admission: AsyncMutex::new(()), state: Mutex::new(BucketState::new(policy)) }
	}
}

struct BucketState {
	tokens: f64,
	max_tokens: f64,
	refill_per_second: f64,
	last_refill: Instant,
}
impl BucketState {
	fn new(policy: &RatePolicy) -> Self {
		let max_tokens = f64::from(policy.burst_capacity);

		Self {
			tokens: max_tokens,
			max_tokens,
			refill_per_second: policy.requests_per_second,
			last_refill: Instant::now(),
		}
	}

	fn refill(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

		self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.max_tokens);
		self.last_refill = now;
	}

	/// Grants one permit, or returns how long the shortfall takes to refill.
	fn try_take(&mut self) -> Option<Duration> {
		self.refill(Instant::now());

		if self.tokens >= 1.0 {
			self.tokens -= 1.0;

			None
		} else {
			let shortfall = 1.0 - self.tokens;
			let wait_ms = (shortfall / self.refill_per_second * 1_000.0).ceil() as u64;

			Some(Duration::from_millis(wait_ms.max(1)))
		}
	}
}
