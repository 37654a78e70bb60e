//! Operation executor contract representing the real call to the external provider.

// self
use crate::{_prelude::*, error::ProviderError, key::OperationKey};

/// Boxed future returned by [`BatchExecutor::execute`].
pub type ExecuteFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<Vec<(String, T)>, ProviderError>> + 'a + Send>>;

/// The opaque provider call, supplied by the caller.
///
/// The guard never inspects the provider's wire format. Implementations perform the
/// real call for one sub-batch of identifiers, return `(identifier, value)` pairs for
/// the items the provider answered, and map any chunk-level failure into the
/// [`ProviderError`] taxonomy so the orchestrator can pick a recovery strategy.
pub trait BatchExecutor<T>
where
	Self: Send + Sync,
{
	/// Executes the provider call for one sub-batch.
	fn execute<'a>(
		&'a self,
		operation: &'a OperationKey,
		chunk: &'a [String],
	) -> ExecuteFuture<'a, T>;
}
