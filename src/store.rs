//! Storage contracts and built-in key-value backends for durable guard state.
//!
//! The guard needs exactly three things from a store: point reads, TTL-aware writes,
//! and an atomic conditional update. Everything that must stay correct across
//! concurrent or cross-process callers (the token ledger above all) goes through
//! [`KvStore::compare_and_swap`]—a plain read-then-write against shared durable
//! state is a correctness bug, not a simplification.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable key-value contract consumed by the cache and the token ledger.
pub trait KvStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present and unexpired.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Persists or replaces the value under `key`, expiring it after `ttl` when set.
	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Option<Duration>) -> StoreFuture<'a, ()>;

	/// Atomically replaces the value under `key` if the stored bytes equal `expected`.
	///
	/// `expected: None` means "insert only if absent". A mismatch hands back the bytes
	/// currently stored so callers can reconcile and retry without a second round trip.
	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: Option<&'a [u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, CasOutcome>;

	/// Removes the value stored under `key`, if any.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Result of a conditional-update attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CasOutcome {
	/// The stored bytes matched the expectation and the replacement was written.
	Updated,
	/// The expectation did not hold; `current` is what the store holds now.
	Mismatch {
		/// Bytes currently stored under the key (`None` when the key is absent).
		current: Option<Vec<u8>>,
	},
}
impl CasOutcome {
	/// Whether the replacement was written.
	pub fn is_updated(&self) -> bool {
		matches!(self, Self::Updated)
	}
}

/// Error type produced by [`KvStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn cas_insert_if_absent_races_once() {
		let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
		let first = store
			.compare_and_swap("counter", None, b"1".to_vec(), None)
			.await
			.expect("First insert-if-absent should succeed.");
		let second = store
			.compare_and_swap("counter", None, b"2".to_vec(), None)
			.await
			.expect("Second insert-if-absent should not be a backend failure.");

		assert!(first.is_updated());
		assert_eq!(second, CasOutcome::Mismatch { current: Some(b"1".to_vec()) });
	}
}
