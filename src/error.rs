//! Guard-level error types shared across limiters, breakers, ledgers, and batch runs.

// self
use crate::{_prelude::*, breaker::BreakerSnapshot, key::DependencyName};

/// Guard-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical guard error exposed by public APIs.
///
/// Rate-limit waits are not errors—they are bounded delays. Everything that does
/// surface here is either a distinguished result kind the orchestrator can act on
/// (quota, circuit, deadline) or a genuine inability to proceed (storage, policy).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Policy(#[from] crate::policy::PolicyError),
	/// Classified provider failure surfaced by an executor.
	#[error(transparent)]
	Provider(#[from] ProviderError),

	/// The dependency's circuit breaker is open and the call was never attempted.
	#[error("Circuit for `{dependency}` is open; retry after the reset timeout.")]
	CircuitOpen {
		/// Dependency whose breaker rejected the call.
		dependency: DependencyName,
		/// Breaker state captured at rejection time, for backoff decisions upstream.
		snapshot: BreakerSnapshot,
	},
	/// A caller-supplied deadline elapsed while waiting.
	#[error("Deadline elapsed while waiting at the {stage} stage.")]
	DeadlineExceeded {
		/// Suspension point that was abandoned.
		stage: &'static str,
	},
}

/// Classified provider failure, supplied by [`BatchExecutor`](crate::ext::BatchExecutor)
/// implementations.
///
/// The guard treats the provider call as opaque; the executor maps whatever wire
/// format the provider speaks into this taxonomy, and the orchestrator picks the
/// recovery strategy from the variant alone.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderError {
	/// The provider signalled quota exhaustion; distinguishable from generic throttling.
	#[error("Provider quota is exhausted: {message}.")]
	QuotaExhausted {
		/// Provider-supplied message summarizing the failure.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Temporary upstream failure; retry with backoff.
	#[error("Provider returned a transient failure: {message}.")]
	Transient {
		/// Provider-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Permanent rejection; retrying cannot help.
	#[error("Provider rejected the request: {message}.")]
	Permanent {
		/// Provider-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl ProviderError {
	/// Returns the upstream Retry-After hint, if one was supplied.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::QuotaExhausted { retry_after, .. } | Self::Transient { retry_after, .. } =>
				*retry_after,
			Self::Permanent { .. } => None,
		}
	}

	/// Whether the failure is worth retrying locally with backoff.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient { .. })
	}

	/// Whether the failure counts against the dependency's circuit breaker.
	///
	/// Quota exhaustion is throttling, not ill health, and permanent rejections are
	/// caller-side; neither moves the breaker.
	pub fn trips_breaker(&self) -> bool {
		matches!(self, Self::Transient { .. })
	}
}
