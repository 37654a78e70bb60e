//! High-level batch orchestration over the guard components.
//!
//! The orchestrator owns the cache, rate limiter, quota manager, and breaker
//! registry so batch runs can focus on classification and recovery. Per-item
//! failures never abort a run; callers always get a partitioned report.

pub mod batch;
pub mod retry;

pub use retry::RetrySchedule;

// self
use crate::{
	_prelude::*,
	breaker::BreakerRegistry,
	cache::ResultCache,
	key::{OperationKey, OwnerId},
	ledger::TokenLedger,
	limiter::RateLimiter,
	policy::PolicySet,
	quota::QuotaManager,
	store::KvStore,
};

/// A batch of identifiers to resolve through one guarded operation.
#[derive(Clone, Debug)]
pub struct BatchRequest {
	/// Operation whose policy governs the run.
	pub operation: OperationKey,
	/// Ordered item identifiers; duplicates are collapsed on entry.
	pub items: Vec<String>,
	/// Ledger owner whose durable budget the run spends, when a ledger is attached.
	pub owner: Option<OwnerId>,
	/// Skips cache reads when true (results are still written back).
	pub bypass_cache: bool,
	/// Deadline after which remaining waits are abandoned.
	pub deadline: Option<Instant>,
}
impl BatchRequest {
	/// Creates a request for the provided operation and identifiers.
	pub fn new<I, S>(operation: OperationKey, items: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			operation,
			items: items.into_iter().map(Into::into).collect(),
			owner: None,
			bypass_cache: false,
			deadline: None,
		}
	}

	/// Spends the run against the provided ledger owner.
	pub fn with_owner(mut self, owner: OwnerId) -> Self {
		self.owner = Some(owner);

		self
	}

	/// Forces fresh provider calls, ignoring cached results.
	pub fn bypass_cache(mut self) -> Self {
		self.bypass_cache = true;

		self
	}

	/// Bounds every wait in the run by the provided deadline.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}
}

/// Where a resolved value came from, so downstream consumers can tell real data
/// from heuristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provenance {
	/// Returned by the provider during this run.
	Fresh,
	/// Served from the result cache.
	Cached,
	/// Produced by the fallback estimator after retries were exhausted.
	Estimated,
}
impl Provenance {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Provenance::Fresh => "fresh",
			Provenance::Cached => "cached",
			Provenance::Estimated => "estimated",
		}
	}
}
impl Display for Provenance {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One successfully resolved item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedItem<T> {
	/// Item identifier.
	pub id: String,
	/// Resolved value.
	pub value: T,
	/// How the value was obtained.
	pub provenance: Provenance,
}

/// Why one item could not be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// The provider rejected the item permanently.
	Permanent,
	/// Transient failures persisted past the retry budget and no estimate was available.
	RetriesExhausted,
	/// The dependency's circuit was open and the chunk was never attempted.
	CircuitOpen,
	/// The request deadline elapsed before the item was attempted.
	DeadlineExceeded,
}

/// One item that could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
	/// Item identifier.
	pub id: String,
	/// Failure classification.
	pub kind: FailureKind,
	/// Human-readable detail, typically the provider's message.
	pub message: String,
}

/// Partitioned outcome of one batch run.
#[derive(Clone, Debug, Default)]
pub struct BatchReport<T> {
	/// Items resolved to a value, fresh, cached, or estimated.
	pub successful: Vec<ResolvedItem<T>>,
	/// Items that could not be resolved.
	pub failed: Vec<FailedItem>,
}
impl<T> BatchReport<T> {
	/// Whether every requested item resolved to a value.
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty()
	}

	/// Counts items per disposition.
	pub fn tally(&self) -> BatchTally {
		let mut tally = BatchTally::default();

		for item in &self.successful {
			match item.provenance {
				Provenance::Fresh => tally.fresh += 1,
				Provenance::Cached => tally.cached += 1,
				Provenance::Estimated => tally.estimated += 1,
			}
		}

		tally.failed = self.failed.len();

		tally
	}
}

/// Per-disposition item counts for one batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchTally {
	/// Items resolved by the provider during the run.
	pub fresh: usize,
	/// Items served from cache.
	pub cached: usize,
	/// Items resolved by the fallback estimator.
	pub estimated: usize,
	/// Items that failed.
	pub failed: usize,
}

/// Composes the guard components into resilient batch execution.
pub struct Orchestrator {
	policies: Arc<PolicySet>,
	limiter: RateLimiter,
	quota: QuotaManager,
	breakers: BreakerRegistry,
	cache: ResultCache,
	ledger: Option<Arc<TokenLedger>>,
}
impl Orchestrator {
	/// Creates an orchestrator over the provided store and policy set.
	pub fn new(store: Arc<dyn KvStore>, policies: Arc<PolicySet>) -> Self {
		Self {
			limiter: RateLimiter::new(policies.clone()),
			quota: QuotaManager::new(policies.clone()),
			breakers: BreakerRegistry::new(),
			cache: ResultCache::new(store),
			ledger: None,
			policies,
		}
	}

	/// Attaches a durable token ledger; runs carrying an owner spend from it.
	pub fn with_ledger(mut self, ledger: Arc<TokenLedger>) -> Self {
		self.ledger = Some(ledger);

		self
	}

	/// The rate limiter backing this orchestrator.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// The quota manager backing this orchestrator.
	pub fn quota(&self) -> &QuotaManager {
		&self.quota
	}

	/// The breaker registry backing this orchestrator (operator reset lives here).
	pub fn breakers(&self) -> &BreakerRegistry {
		&self.breakers
	}
}
