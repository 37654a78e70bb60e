// self
use crate::{
	breaker::BreakerState,
	key::{DependencyName, OperationKey},
	obs::CooldownPhase,
	orchestrate::BatchTally,
};

/// Counts a breaker transition via the global metrics recorder (when enabled).
pub fn record_breaker_transition(dependency: &DependencyName, to: BreakerState) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"upstream_guard_breaker_transitions_total",
			"dependency" => dependency.to_string(),
			"to" => to.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (dependency, to);
	}
}

/// Counts a cooldown phase change via the global metrics recorder (when enabled).
pub fn record_cooldown(operation: &OperationKey, phase: CooldownPhase) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"upstream_guard_quota_cooldowns_total",
			"operation" => operation.to_string(),
			"phase" => phase.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, phase);
	}
}

/// Counts a batch's item dispositions via the global metrics recorder (when enabled).
pub fn record_batch_outcome(operation: &OperationKey, tally: &BatchTally) {
	#[cfg(feature = "metrics")]
	{
		for (disposition, count) in [
			("fresh", tally.fresh),
			("cached", tally.cached),
			("estimated", tally.estimated),
			("failed", tally.failed),
		] {
			if count > 0 {
				metrics::counter!(
					"upstream_guard_batch_items_total",
					"operation" => operation.to_string(),
					"disposition" => disposition
				)
				.increment(count as u64);
			}
		}
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, tally);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_fns_noop_without_metrics() {
		let dependency = DependencyName::new("pricing-api")
			.expect("Dependency fixture should be valid.");
		let operation =
			OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");

		record_breaker_transition(&dependency, BreakerState::Open);
		record_cooldown(&operation, CooldownPhase::Entered);
		record_batch_outcome(
			&operation,
			&BatchTally { fresh: 1, cached: 2, estimated: 0, failed: 1 },
		);
	}
}
