//! Simple file-backed [`KvStore`] for lightweight deployments and bots.
//!
//! Every mutation rewrites a JSON snapshot through a temp-file rename, so a crash
//! never leaves a half-written ledger behind. Suitable for single-host setups where
//! cross-invocation durability matters more than storage throughput.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CasOutcome, KvStore, StoreError, StoreFuture},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedValue {
	bytes: Vec<u8>,
	#[serde(with = "time::serde::rfc3339::option")]
	expires_at: Option<OffsetDateTime>,
}
impl PersistedValue {
	fn live(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// Persists guard state to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, PersistedValue>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, PersistedValue>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(String, PersistedValue)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;
		let now = OffsetDateTime::now_utc();

		// Expired values are dropped at load time instead of lingering in the snapshot.
		Ok(entries.into_iter().filter(|(_, value)| value.live(now)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, PersistedValue>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn expiry_for(ttl: Option<Duration>) -> Option<OffsetDateTime> {
		ttl.map(|ttl| OffsetDateTime::now_utc() + ttl)
	}
}
impl KvStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self.inner.read().get(key).filter(|value| value.live(now)).map(|v| v.bytes.clone()))
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.insert(
				key.to_owned(),
				PersistedValue { bytes: value, expires_at: Self::expiry_for(ttl) },
			);
			self.persist_locked(&guard)?;

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
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.inner.write();
			let current = guard.get(key).filter(|value| value.live(now));
			let matches = match (current, expected) {
				(None, None) => true,
				(Some(value), Some(expected)) => value.bytes == expected,
				_ => false,
			};

			if matches {
				guard.insert(
					key.to_owned(),
					PersistedValue { bytes: replacement, expires_at: Self::expiry_for(ttl) },
				);
				self.persist_locked(&guard)?;

				Ok(CasOutcome::Updated)
			} else {
				Ok(CasOutcome::Mismatch {
					current: guard.get(key).filter(|v| v.live(now)).map(|v| v.bytes.clone()),
				})
			}
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(key).is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(())
		})
	}
}
