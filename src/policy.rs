//! Per-operation configuration surface for every guard component.
//!
//! All knobs are explicit; the only defaults are the documented fallbacks baked into
//! [`OperationPolicy::default`]. Policies are grouped per concern (rate, retry, quota,
//! breaker, batch) and collected in a [`PolicySet`] built once at the composition root
//! and passed by reference—no ambient global configuration.

/// Builder API for assembling validated operation policies.
pub mod builder;

pub use builder::{OperationPolicyBuilder, PolicyError};

// self
use crate::{
	_prelude::*,
	key::{DependencyName, OperationKey},
};

/// Token-bucket settings for one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePolicy {
	/// Steady-state refill rate, in permits per second.
	pub requests_per_second: f64,
	/// Maximum permits the bucket can hold (burst ceiling).
	pub burst_capacity: u32,
}
impl Default for RatePolicy {
	fn default() -> Self {
		Self { requests_per_second: 5.0, burst_capacity: 5 }
	}
}

/// Bounded exponential backoff settings for transient failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Retry attempts after the initial call.
	pub max_retries: u32,
	/// Delay before the first retry.
	pub initial_delay: Duration,
	/// Ceiling applied to every computed delay.
	pub max_delay: Duration,
	/// Multiplier applied per attempt.
	pub backoff_multiplier: f64,
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			initial_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(30),
			backoff_multiplier: 2.0,
		}
	}
}

/// Daily-cap and cooldown settings for one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
	/// Requests allowed per UTC calendar day; `None` leaves the dimension uncapped.
	pub daily_quota: Option<u64>,
	/// Cooldown applied when the provider signals exhaustion without a Retry-After hint.
	pub default_retry_after: Duration,
}
impl Default for QuotaPolicy {
	fn default() -> Self {
		Self { daily_quota: None, default_retry_after: Duration::from_secs(3_600) }
	}
}

/// Circuit-breaker settings for the dependency behind one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerPolicy {
	/// Failures within the monitoring window required to open the circuit.
	pub failure_threshold: u32,
	/// How long an open circuit fast-fails before allowing a trial call.
	pub reset_timeout: Duration,
	/// Trial calls permitted while half-open before reopening.
	pub half_open_max_attempts: u32,
	/// Sliding window over which failures and volume are counted.
	pub monitoring_period: Duration,
	/// Minimum requests in the window before the circuit may open.
	pub volume_threshold: u32,
}
impl Default for BreakerPolicy {
	fn default() -> Self {
		Self {
			failure_threshold: 5,
			reset_timeout: Duration::from_secs(60),
			half_open_max_attempts: 3,
			monitoring_period: Duration::from_secs(60),
			volume_threshold: 10,
		}
	}
}

/// Batching, caching, and ledger-cost settings for one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchPolicy {
	/// Maximum identifiers per sub-batch sent to the executor.
	pub batch_size: usize,
	/// Fixed delay inserted between sub-batches, beyond the rate limiter.
	pub batch_delay: Duration,
	/// Time-to-live for cached per-item results.
	pub cache_ttl: Duration,
	/// Ledger tokens consumed per provider call item, when a ledger is attached.
	pub tokens_per_call: f64,
}
impl Default for BatchPolicy {
	fn default() -> Self {
		Self {
			batch_size: 10,
			batch_delay: Duration::ZERO,
			cache_ttl: Duration::from_secs(900),
			tokens_per_call: 1.0,
		}
	}
}

/// Complete per-operation policy consumed across the guard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationPolicy {
	/// Token-bucket settings.
	pub rate: RatePolicy,
	/// Retry/backoff settings.
	pub retry: RetryPolicy,
	/// Quota settings.
	pub quota: QuotaPolicy,
	/// Circuit-breaker settings.
	pub breaker: BreakerPolicy,
	/// Batching/caching settings.
	pub batch: BatchPolicy,
	/// Dependency guarded by the operation's breaker; defaults to the operation key
	/// itself, letting several operations share one breaker when they name the same
	/// dependency.
	pub dependency: Option<DependencyName>,
}
impl OperationPolicy {
	/// Starts a validated builder seeded with the documented fallbacks.
	pub fn builder() -> OperationPolicyBuilder {
		OperationPolicyBuilder::default()
	}

	/// Resolves the breaker dependency for `operation`.
	pub fn dependency_for(&self, operation: &OperationKey) -> DependencyName {
		self.dependency.clone().unwrap_or_else(|| DependencyName::from(operation))
	}
}

/// Settings for a durable ledger balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerPolicy {
	/// Balance ceiling per owner.
	pub max_tokens: f64,
	/// Replenishment rate per owner.
	pub tokens_per_minute: f64,
	/// How long a loaded entry may serve reads before a fresh storage round trip.
	pub cache_ttl: Duration,
}
impl LedgerPolicy {
	/// Creates a validated ledger policy with the default 30-second local cache.
	pub fn new(max_tokens: f64, tokens_per_minute: f64) -> Result<Self, PolicyError> {
		if !(max_tokens.is_finite() && max_tokens > 0.0) {
			return Err(PolicyError::NonPositiveLedgerCapacity { value: max_tokens });
		}
		if !(tokens_per_minute.is_finite() && tokens_per_minute > 0.0) {
			return Err(PolicyError::NonPositiveLedgerRate { value: tokens_per_minute });
		}

		Ok(Self { max_tokens, tokens_per_minute, cache_ttl: Duration::from_secs(30) })
	}

	/// Overrides the local cache lifetime.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}
}

/// Policy lookup table: one default plus per-operation overrides.
#[derive(Clone, Debug, Default)]
pub struct PolicySet {
	default: OperationPolicy,
	overrides: HashMap<OperationKey, OperationPolicy>,
}
impl PolicySet {
	/// Creates a set that answers every lookup with `default`.
	pub fn new(default: OperationPolicy) -> Self {
		Self { default, overrides: HashMap::new() }
	}

	/// Registers an override for one operation.
	pub fn with_operation(mut self, operation: OperationKey, policy: OperationPolicy) -> Self {
		self.overrides.insert(operation, policy);

		self
	}

	/// Returns the policy governing `operation`.
	pub fn policy_for(&self, operation: &OperationKey) -> &OperationPolicy {
		self.overrides.get(operation).unwrap_or(&self.default)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn policy_set_falls_back_to_default() {
		let op = OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");
		let other = OperationKey::new("fetch-stock").expect("Operation fixture should be valid.");
		let tuned = OperationPolicy::builder()
			.requests_per_second(1.0)
			.build()
			.expect("Tuned policy fixture should validate.");
		let set = PolicySet::new(OperationPolicy::default()).with_operation(op.clone(), tuned);

		assert_eq!(set.policy_for(&op).rate.requests_per_second, 1.0);
		assert_eq!(
			set.policy_for(&other).rate.requests_per_second,
			RatePolicy::default().requests_per_second,
		);
	}

	#[test]
	fn dependency_defaults_to_operation_key() {
		let op = OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");
		let policy = OperationPolicy::default();

		assert_eq!(policy.dependency_for(&op).as_ref(), "fetch-prices");

		let shared = OperationPolicy {
			dependency: Some(
				DependencyName::new("pricing-api").expect("Dependency fixture should be valid."),
			),
			..Default::default()
		};

		assert_eq!(shared.dependency_for(&op).as_ref(), "pricing-api");
	}

	#[test]
	fn ledger_policy_rejects_non_positive_rates() {
		assert!(LedgerPolicy::new(0.0, 10.0).is_err());
		assert!(LedgerPolicy::new(100.0, -1.0).is_err());
		assert!(LedgerPolicy::new(f64::NAN, 10.0).is_err());

		let policy = LedgerPolicy::new(100.0, 10.0)
			.expect("Positive ledger policy fixture should validate.");

		assert_eq!(policy.cache_ttl, Duration::from_secs(30));
	}
}
