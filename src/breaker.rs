//! Per-dependency circuit breakers guarding against failure cascades.
//!
//! Breakers are independent of rate limiting: they watch classified call outcomes and
//! fast-fail while a dependency is known unhealthy. Instances live in an explicit
//! [`BreakerRegistry`] built at the composition root and passed by reference—there is
//! no process-wide static registry.

// std
use std::collections::VecDeque;
// self
use crate::{
	_prelude::*,
	error::ProviderError,
	key::DependencyName,
	obs,
};
pub use crate::policy::BreakerPolicy;

/// Lifecycle states of one circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BreakerState {
	/// Normal operation; failures are counted against the monitoring window.
	Closed,
	/// Fast-fail; calls are rejected until the reset timeout elapses.
	Open,
	/// Trial probing; a limited number of calls test whether health returned.
	HalfOpen,
}
impl BreakerState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			BreakerState::Closed => "closed",
			BreakerState::Open => "open",
			BreakerState::HalfOpen => "half_open",
		}
	}
}
impl Display for BreakerState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Point-in-time view of a breaker, carried inside [`Error::CircuitOpen`] rejections
/// so upstream code can make backoff decisions without another lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakerSnapshot {
	/// State at capture time.
	pub state: BreakerState,
	/// Failures inside the monitoring window.
	pub failure_count: u32,
	/// Successes inside the monitoring window.
	pub success_count: u32,
	/// Total requests inside the monitoring window.
	pub window_requests: u32,
	/// Trial calls consumed while half-open.
	pub half_open_attempts: u32,
	/// Age of the most recent counted failure.
	pub last_failure_age: Option<Duration>,
	/// Time remaining until the next trial is admitted, when open.
	pub retry_in: Option<Duration>,
}

struct Sample {
	at: Instant,
	failed: bool,
}

struct Core {
	state: BreakerState,
	samples: VecDeque<Sample>,
	last_failure_at: Option<Instant>,
	next_attempt_at: Option<Instant>,
	half_open_attempts: u32,
}
impl Core {
	fn new() -> Self {
		Self {
			state: BreakerState::Closed,
			samples: VecDeque::new(),
			last_failure_at: None,
			next_attempt_at: None,
			half_open_attempts: 0,
		}
	}

	fn prune(&mut self, now: Instant, window: Duration) {
		while self
			.samples
			.front()
			.is_some_and(|sample| now.saturating_duration_since(sample.at) > window)
		{
			self.samples.pop_front();
		}
	}

	fn failures(&self) -> u32 {
		self.samples.iter().filter(|sample| sample.failed).count() as u32
	}

	fn successes(&self) -> u32 {
		self.samples.iter().filter(|sample| !sample.failed).count() as u32
	}

	fn snapshot(&self, now: Instant) -> BreakerSnapshot {
		BreakerSnapshot {
			state: self.state,
			failure_count: self.failures(),
			success_count: self.successes(),
			window_requests: self.samples.len() as u32,
			half_open_attempts: self.half_open_attempts,
			last_failure_age: self.last_failure_at.map(|at| now.saturating_duration_since(at)),
			retry_in: self
				.next_attempt_at
				.map(|at| at.saturating_duration_since(now))
				.filter(|remaining| !remaining.is_zero()),
		}
	}
}

/// Failure-cascade guard for one named dependency.
pub struct CircuitBreaker {
	dependency: DependencyName,
	policy: BreakerPolicy,
	core: Mutex<Core>,
}
impl CircuitBreaker {
	/// Creates a closed breaker for `dependency`.
	pub fn new(dependency: DependencyName, policy: BreakerPolicy) -> Self {
		Self { dependency, policy, core: Mutex::new(Core::new()) }
	}

	/// Runs a classified provider call under protection.
	///
	/// Rejects immediately with [`Error::CircuitOpen`]—without polling the call—while
	/// the circuit is open and the reset timeout has not elapsed. The protected
	/// failure otherwise surfaces to the caller as-is.
	pub async fn execute<T, Fut>(&self, call: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T, ProviderError>>,
	{
		self.admit()?;

		match call.await {
			Ok(value) => {
				self.on_success();

				Ok(value)
			},
			Err(e) => {
				// Quota exhaustion is throttling and permanent rejections are
				// caller-side; neither is a health signal for this dependency.
				if e.trips_breaker() {
					self.on_failure();
				}

				Err(e.into())
			},
		}
	}

	/// Returns the current state without mutating it.
	pub fn state(&self) -> BreakerState {
		self.core.lock().state
	}

	/// Captures a point-in-time snapshot of the breaker.
	pub fn snapshot(&self) -> BreakerSnapshot {
		self.core.lock().snapshot(Instant::now())
	}

	/// Operator escape hatch: forces the circuit closed with all counters cleared.
	pub fn reset(&self) {
		let mut core = self.core.lock();
		let from = core.state;

		*core = Core::new();

		if from != BreakerState::Closed {
			obs::breaker_transition(&self.dependency, from, BreakerState::Closed);
		}
	}

	fn admit(&self) -> Result<()> {
		let now = Instant::now();
		let mut core = self.core.lock();

		match core.state {
			BreakerState::Closed => Ok(()),
			BreakerState::Open => {
				if core.next_attempt_at.is_some_and(|at| now >= at) {
					self.transition(&mut core, BreakerState::HalfOpen);
					core.half_open_attempts = 1;

					Ok(())
				} else {
					Err(self.rejection(&core, now))
				}
			},
			BreakerState::HalfOpen =>
				if core.half_open_attempts >= self.policy.half_open_max_attempts {
					// The trial budget is spent without a qualifying success.
					self.transition(&mut core, BreakerState::Open);
					core.next_attempt_at = Some(now + self.policy.reset_timeout);

					Err(self.rejection(&core, now))
				} else {
					core.half_open_attempts += 1;

					Ok(())
				},
		}
	}

	fn on_success(&self) {
		let now = Instant::now();
		let mut core = self.core.lock();

		match core.state {
			BreakerState::HalfOpen => {
				self.transition(&mut core, BreakerState::Closed);
				core.samples.clear();
				core.half_open_attempts = 0;
				core.next_attempt_at = None;
			},
			BreakerState::Closed => {
				core.samples.push_back(Sample { at: now, failed: false });
				core.prune(now, self.policy.monitoring_period);
			},
			// A late result from before the circuit opened carries no signal.
			BreakerState::Open => {},
		}
	}

	fn on_failure(&self) {
		let now = Instant::now();
		let mut core = self.core.lock();

		core.last_failure_at = Some(now);

		match core.state {
			BreakerState::Closed => {
				core.samples.push_back(Sample { at: now, failed: true });
				core.prune(now, self.policy.monitoring_period);

				// The volume guard keeps a tiny, non-representative sample from
				// opening the circuit.
				if core.failures() >= self.policy.failure_threshold
					&& core.samples.len() as u32 >= self.policy.volume_threshold
				{
					self.transition(&mut core, BreakerState::Open);
					core.next_attempt_at = Some(now + self.policy.reset_timeout);
				}
			},
			BreakerState::HalfOpen => {
				self.transition(&mut core, BreakerState::Open);
				core.next_attempt_at = Some(now + self.policy.reset_timeout);
			},
			BreakerState::Open => {},
		}
	}

	fn rejection(&self, core: &Core, now: Instant) -> Error {
		Error::CircuitOpen { dependency: self.dependency.clone(), snapshot: core.snapshot(now) }
	}

	fn transition(&self, core: &mut Core, to: BreakerState) {
		let from = core.state;

		core.state = to;
		obs::breaker_transition(&self.dependency, from, to);
	}
}

/// Named-breaker registry constructed once at the composition root.
///
/// The first reference to a dependency creates its breaker and fixes its policy;
/// breakers then live for the registry's lifetime and are reset only by explicit
/// operator action.
#[derive(Default)]
pub struct BreakerRegistry {
	breakers: Mutex<HashMap<DependencyName, Arc<CircuitBreaker>>>,
}
impl BreakerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the breaker for `dependency`, creating it with `policy` on first use.
	pub fn breaker(&self, dependency: &DependencyName, policy: &BreakerPolicy) -> Arc<CircuitBreaker> {
		let mut breakers = self.breakers.lock();

		breakers
			.entry(dependency.clone())
			.or_insert_with(|| Arc::new(CircuitBreaker::new(dependency.clone(), policy.clone())))
			.clone()
	}

	/// Returns the breaker for `dependency`, if one was created.
	pub fn get(&self, dependency: &DependencyName) -> Option<Arc<CircuitBreaker>> {
		self.breakers.lock().get(dependency).cloned()
	}

	/// Resets every registered breaker to closed.
	pub fn reset_all(&self) {
		for breaker in self.breakers.lock().values() {
			breaker.reset();
		}
	}
}
