//! Per-item result cache backed by the durable key-value store.
//!
//! Cached values are JSON, namespaced per operation, and expire via the store's TTL
//! support. A corrupt or shape-changed payload degrades to a miss; only backend
//! failures surface.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	key::OperationKey,
	store::{KvStore, StoreError},
};

/// TTL-bound cache of per-item operation results.
#[derive(Clone)]
pub struct ResultCache {
	store: Arc<dyn KvStore>,
	namespace: String,
}
impl ResultCache {
	/// Creates a cache over `store` under the default `results` namespace.
	pub fn new(store: Arc<dyn KvStore>) -> Self {
		Self { store, namespace: "results".into() }
	}

	/// Overrides the key namespace, isolating this cache from other users of the store.
	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();

		self
	}

	/// Fetches the cached value for one item, if present, unexpired, and parseable.
	pub async fn get<T>(&self, operation: &OperationKey, item: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		match self.store.get(&self.key(operation, item)).await? {
			Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
			None => Ok(None),
		}
	}

	/// Caches one item's value for `ttl`. A zero TTL disables caching entirely.
	pub async fn put<T>(
		&self,
		operation: &OperationKey,
		item: &str,
		value: &T,
		ttl: Duration,
	) -> Result<(), StoreError>
	where
		T: Serialize,
	{
		if ttl.is_zero() {
			return Ok(());
		}

		let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize cached result: {e}"),
		})?;

		self.store.put(&self.key(operation, item), bytes, Some(ttl)).await
	}

	fn key(&self, operation: &OperationKey, item: &str) -> String {
		format!("{}/{}/{}", self.namespace, operation, item)
	}
}
