//! Fallback estimation contract for graceful degradation.

// self
use crate::key::OperationKey;

/// Produces bounded-confidence estimates for items whose provider calls exhausted
/// their retries.
///
/// Estimates flow into the batch report marked as such, so downstream consumers can
/// always distinguish real data from heuristics. Returning `None` declines to
/// estimate and the item is reported failed instead.
pub trait FallbackProvider<T>
where
	Self: Send + Sync,
{
	/// Produces an estimate for one item, or `None` when no estimate is defensible.
	fn estimate(&self, operation: &OperationKey, item: &str) -> Option<T>;
}
