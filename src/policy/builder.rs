// self
use crate::{
	_prelude::*,
	key::DependencyName,
	policy::{BatchPolicy, BreakerPolicy, OperationPolicy, QuotaPolicy, RatePolicy, RetryPolicy},
};

/// Errors raised while constructing or validating policies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ThisError)]
pub enum PolicyError {
	/// Refill rate must be a positive, finite number.
	#[error("requests_per_second must be positive and finite, got {value}.")]
	NonPositiveRate {
		/// Rate that failed validation.
		value: f64,
	},
	/// The bucket must hold at least one permit.
	#[error("burst_capacity must be at least 1.")]
	ZeroBurstCapacity,
	/// Backoff must not shrink delays between attempts.
	#[error("backoff_multiplier must be at least 1.0, got {value}.")]
	MultiplierBelowOne {
		/// Multiplier that failed validation.
		value: f64,
	},
	/// The delay ceiling must not undercut the first delay.
	#[error("max_retry_delay must be at least initial_retry_delay.")]
	InvertedRetryDelays,
	/// The breaker needs at least one failure to act on.
	#[error("failure_threshold must be at least 1.")]
	ZeroFailureThreshold,
	/// The volume guard needs at least one request to act on.
	#[error("volume_threshold must be at least 1.")]
	ZeroVolumeThreshold,
	/// Half-open needs at least one trial call.
	#[error("half_open_max_attempts must be at least 1.")]
	ZeroHalfOpenAttempts,
	/// The sliding window must span a positive duration.
	#[error("monitoring_period must be positive.")]
	EmptyMonitoringPeriod,
	/// An open circuit must hold for a positive duration.
	#[error("reset_timeout must be positive.")]
	EmptyResetTimeout,
	/// Sub-batches must carry at least one identifier.
	#[error("batch_size must be at least 1.")]
	ZeroBatchSize,
	/// Ledger cost per call cannot be negative.
	#[error("tokens_per_call must be non-negative and finite, got {value}.")]
	NegativeTokenCost {
		/// Cost that failed validation.
		value: f64,
	},
	/// Ledger capacity must be positive.
	#[error("Ledger max_tokens must be positive and finite, got {value}.")]
	NonPositiveLedgerCapacity {
		/// Capacity that failed validation.
		value: f64,
	},
	/// Ledger refill rate must be positive.
	#[error("Ledger tokens_per_minute must be positive and finite, got {value}.")]
	NonPositiveLedgerRate {
		/// Rate that failed validation.
		value: f64,
	},
	/// A single demand can never exceed the balance ceiling.
	#[error("Requested {requested} ledger tokens but the balance is capped at {capacity}.")]
	LedgerDemandExceedsCapacity {
		/// Tokens requested in one consumption.
		requested: f64,
		/// Balance ceiling the owner's entry replenishes toward.
		capacity: f64,
	},
}

/// Builder for [`OperationPolicy`] values, seeded with the documented fallbacks.
#[derive(Clone, Debug, Default)]
pub struct OperationPolicyBuilder {
	policy: OperationPolicy,
}
impl OperationPolicyBuilder {
	/// Sets the steady-state permit refill rate.
	pub fn requests_per_second(mut self, value: f64) -> Self {
		self.policy.rate.requests_per_second = value;

		self
	}

	/// Sets the bucket's burst ceiling.
	pub fn burst_capacity(mut self, value: u32) -> Self {
		self.policy.rate.burst_capacity = value;

		self
	}

	/// Sets the retry attempt budget.
	pub fn max_retries(mut self, value: u32) -> Self {
		self.policy.retry.max_retries = value;

		self
	}

	/// Sets the delay before the first retry.
	pub fn initial_retry_delay(mut self, value: Duration) -> Self {
		self.policy.retry.initial_delay = value;

		self
	}

	/// Sets the ceiling applied to computed retry delays.
	pub fn max_retry_delay(mut self, value: Duration) -> Self {
		self.policy.retry.max_delay = value;

		self
	}

	/// Sets the per-attempt backoff multiplier.
	pub fn backoff_multiplier(mut self, value: f64) -> Self {
		self.policy.retry.backoff_multiplier = value;

		self
	}

	/// Caps requests per UTC calendar day.
	pub fn daily_quota(mut self, value: u64) -> Self {
		self.policy.quota.daily_quota = Some(value);

		self
	}

	/// Sets the cooldown used when the provider gives no Retry-After hint.
	pub fn default_retry_after(mut self, value: Duration) -> Self {
		self.policy.quota.default_retry_after = value;

		self
	}

	/// Sets the failure count that opens the circuit.
	pub fn failure_threshold(mut self, value: u32) -> Self {
		self.policy.breaker.failure_threshold = value;

		self
	}

	/// Sets how long an open circuit fast-fails.
	pub fn reset_timeout(mut self, value: Duration) -> Self {
		self.policy.breaker.reset_timeout = value;

		self
	}

	/// Sets the half-open trial budget.
	pub fn half_open_max_attempts(mut self, value: u32) -> Self {
		self.policy.breaker.half_open_max_attempts = value;

		self
	}

	/// Sets the sliding monitoring window.
	pub fn monitoring_period(mut self, value: Duration) -> Self {
		self.policy.breaker.monitoring_period = value;

		self
	}

	/// Sets the minimum request volume before the circuit may open.
	pub fn volume_threshold(mut self, value: u32) -> Self {
		self.policy.breaker.volume_threshold = value;

		self
	}

	/// Sets the sub-batch size.
	pub fn batch_size(mut self, value: usize) -> Self {
		self.policy.batch.batch_size = value;

		self
	}

	/// Sets the fixed inter-batch delay.
	pub fn batch_delay(mut self, value: Duration) -> Self {
		self.policy.batch.batch_delay = value;

		self
	}

	/// Sets the result cache time-to-live.
	pub fn cache_ttl(mut self, value: Duration) -> Self {
		self.policy.batch.cache_ttl = value;

		self
	}

	/// Sets the ledger tokens consumed per call item.
	pub fn tokens_per_call(mut self, value: f64) -> Self {
		self.policy.batch.tokens_per_call = value;

		self
	}

	/// Names the dependency whose breaker guards this operation.
	pub fn dependency(mut self, value: DependencyName) -> Self {
		self.policy.dependency = Some(value);

		self
	}

	/// Consumes the builder and validates the resulting policy.
	pub fn build(self) -> Result<OperationPolicy, PolicyError> {
		let OperationPolicy { rate, retry, quota: _, breaker, batch, dependency: _ } = &self.policy;

		validate_rate(rate)?;
		validate_retry(retry)?;
		validate_breaker(breaker)?;
		validate_batch(batch)?;

		Ok(self.policy)
	}
}

fn validate_rate(rate: &RatePolicy) -> Result<(), PolicyError> {
	if !(rate.requests_per_second.is_finite() && rate.requests_per_second > 0.0) {
		return Err(PolicyError::NonPositiveRate { value: rate.requests_per_second });
	}
	if rate.burst_capacity == 0 {
		return Err(PolicyError::ZeroBurstCapacity);
	}

	Ok(())
}

fn validate_retry(retry: &RetryPolicy) -> Result<(), PolicyError> {
	if !(retry.backoff_multiplier.is_finite() && retry.backoff_multiplier >= 1.0) {
		return Err(PolicyError::MultiplierBelowOne { value: retry.backoff_multiplier });
	}
	if retry.max_delay < retry.initial_delay {
		return Err(PolicyError::InvertedRetryDelays);
	}

	Ok(())
}

fn validate_breaker(breaker: &BreakerPolicy) -> Result<(), PolicyError> {
	if breaker.failure_threshold == 0 {
		return Err(PolicyError::ZeroFailureThreshold);
	}
	if breaker.volume_threshold == 0 {
		return Err(PolicyError::ZeroVolumeThreshold);
	}
	if breaker.half_open_max_attempts == 0 {
		return Err(PolicyError::ZeroHalfOpenAttempts);
	}
	if breaker.monitoring_period.is_zero() {
		return Err(PolicyError::EmptyMonitoringPeriod);
	}
	if breaker.reset_timeout.is_zero() {
		return Err(PolicyError::EmptyResetTimeout);
	}

	Ok(())
}

fn validate_batch(batch: &BatchPolicy) -> Result<(), PolicyError> {
	if batch.batch_size == 0 {
		return Err(PolicyError::ZeroBatchSize);
	}
	if !(batch.tokens_per_call.is_finite() && batch.tokens_per_call >= 0.0) {
		return Err(PolicyError::NegativeTokenCost { value: batch.tokens_per_call });
	}

	Ok(())
}
