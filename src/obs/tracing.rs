// self
use crate::{
	_prelude::*,
	breaker::BreakerState,
	key::{DependencyName, OperationKey},
	obs::CooldownPhase,
	orchestrate::BatchTally,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRun<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRun<F> = F;

/// A span builder used by guard batch runs.
#[derive(Clone, Debug)]
pub struct GuardSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl GuardSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(operation: &OperationKey, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("upstream_guard.batch", operation = %operation, stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRun<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a breaker transition event (when tracing is enabled).
pub fn trace_breaker_transition(dependency: &DependencyName, from: BreakerState, to: BreakerState) {
	#[cfg(feature = "tracing")]
	{
		if to == BreakerState::Open {
			tracing::warn!(
				dependency = %dependency,
				from = from.as_str(),
				to = to.as_str(),
				"circuit opened",
			);
		} else {
			tracing::info!(
				dependency = %dependency,
				from = from.as_str(),
				to = to.as_str(),
				"circuit state changed",
			);
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (dependency, from, to);
	}
}

/// Emits a cooldown phase event (when tracing is enabled).
pub fn trace_cooldown(operation: &OperationKey, phase: CooldownPhase) {
	#[cfg(feature = "tracing")]
	{
		match phase {
			CooldownPhase::Entered =>
				tracing::warn!(operation = %operation, "quota cooldown entered"),
			CooldownPhase::Exited =>
				tracing::info!(operation = %operation, "quota cooldown exited"),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, phase);
	}
}

/// Emits a batch outcome event (when tracing is enabled).
pub fn trace_batch_outcome(operation: &OperationKey, tally: &BatchTally) {
	#[cfg(feature = "tracing")]
	{
		if tally.failed > 0 {
			tracing::warn!(
				operation = %operation,
				fresh = tally.fresh,
				cached = tally.cached,
				estimated = tally.estimated,
				failed = tally.failed,
				"batch completed with failures",
			);
		} else {
			tracing::debug!(
				operation = %operation,
				fresh = tally.fresh,
				cached = tally.cached,
				estimated = tally.estimated,
				"batch completed",
			);
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, tally);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn span_builds_without_tracing() {
		let operation =
			OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");
		let _span = GuardSpan::new(&operation, "test");
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let operation =
			OperationKey::new("fetch-prices").expect("Operation fixture should be valid.");
		let span = GuardSpan::new(&operation, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
