//! Thread-safe in-memory [`KvStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{CasOutcome, KvStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, StoredValue>>>;

#[derive(Clone, Debug)]
struct StoredValue {
	bytes: Vec<u8>,
	expires_at: Option<OffsetDateTime>,
}
impl StoredValue {
	fn live(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// Thread-safe storage backend that keeps values in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	fn expiry_for(ttl: Option<Duration>) -> Option<OffsetDateTime> {
		ttl.map(|ttl| OffsetDateTime::now_utc() + ttl)
	}

	fn get_now(map: StoreMap, key: String) -> Option<Vec<u8>> {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get(&key) {
			Some(value) if value.live(now) => Some(value.bytes.clone()),
			Some(_) => {
				guard.remove(&key);

				None
			},
			None => None,
		}
	}

	fn put_now(map: StoreMap, key: String, bytes: Vec<u8>, ttl: Option<Duration>) {
		map.write().insert(key, StoredValue { bytes, expires_at: Self::expiry_for(ttl) });
	}

	fn cas_now(
		map: StoreMap,
		key: String,
		expected: Option<&[u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> CasOutcome {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();
		let current = guard.get(&key).filter(|value| value.live(now));
		let matches = match (current, expected) {
			(None, None) => true,
			(Some(value), Some(expected)) => value.bytes == expected,
			_ => false,
		};

		if matches {
			guard.insert(key, StoredValue { bytes: replacement, expires_at: Self::expiry_for(ttl) });

			CasOutcome::Updated
		} else {
			CasOutcome::Mismatch {
				current: guard.get(&key).filter(|v| v.live(now)).map(|v| v.bytes.clone()),
			}
		}
	}

	fn remove_now(map: StoreMap, key: String) {
		map.write().remove(&key);
	}
}
impl KvStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::get_now(map, key)) })
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::put_now(map, key, value, ttl);

			Ok(())
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: Option<&'a [u8]>,
		replacement: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, CasOutcome> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::cas_now(map, key, expected, replacement, ttl)) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::remove_now(map, key);

			Ok(())
		})
	}
}
