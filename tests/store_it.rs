// std
use std::{env, fs, process, sync::Arc, time::Duration};
// crates.io
use time::OffsetDateTime;
// self
use upstream_guard::store::{CasOutcome, FileStore, KvStore, MemoryStore};

fn backends() -> Vec<(Arc<dyn KvStore>, Option<std::path::PathBuf>)> {
	let path = env::temp_dir().join(format!(
		"upstream_guard_store_it_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	));
	let file = FileStore::open(&path).expect("Opening the file store fixture should succeed.");

	vec![(Arc::new(MemoryStore::default()), None), (Arc::new(file), Some(path))]
}

fn cleanup(path: Option<std::path::PathBuf>) {
	if let Some(path) = path {
		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary store snapshot {}: {e}", path.display())
		});
	}
}

#[tokio::test]
async fn get_put_remove_contract_holds_for_every_backend() {
	for (store, path) in backends() {
		assert_eq!(store.get("missing").await.expect("Reading a missing key should succeed."), None);

		store
			.put("present", b"value".to_vec(), None)
			.await
			.expect("Writing a value should succeed.");
		assert_eq!(
			store.get("present").await.expect("Reading a written key should succeed."),
			Some(b"value".to_vec()),
		);

		store.remove("present").await.expect("Removing a key should succeed.");
		assert_eq!(
			store.get("present").await.expect("Reading a removed key should succeed."),
			None,
		);

		cleanup(path);
	}
}

#[tokio::test]
async fn ttl_expires_values() {
	for (store, path) in backends() {
		store
			.put("ephemeral", b"value".to_vec(), Some(Duration::from_millis(50)))
			.await
			.expect("Writing a TTL value should succeed.");
		assert_eq!(
			store.get("ephemeral").await.expect("Reading before expiry should succeed."),
			Some(b"value".to_vec()),
		);

		tokio::time::sleep(Duration::from_millis(80)).await;

		assert_eq!(
			store.get("ephemeral").await.expect("Reading after expiry should succeed."),
			None,
			"An expired value must read as absent.",
		);

		cleanup(path);
	}
}

#[tokio::test]
async fn cas_enforces_the_expectation() {
	for (store, path) in backends() {
		let inserted = store
			.compare_and_swap("balance", None, b"100".to_vec(), None)
			.await
			.expect("Insert-if-absent should not be a backend failure.");

		assert!(inserted.is_updated());

		let updated = store
			.compare_and_swap("balance", Some(b"100"), b"40".to_vec(), None)
			.await
			.expect("A matching conditional update should not be a backend failure.");

		assert!(updated.is_updated());

		let stale = store
			.compare_and_swap("balance", Some(b"100"), b"0".to_vec(), None)
			.await
			.expect("A stale conditional update should not be a backend failure.");

		assert_eq!(stale, CasOutcome::Mismatch { current: Some(b"40".to_vec()) });

		cleanup(path);
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cas_admits_exactly_one_writer() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());

	store
		.put("balance", b"100".to_vec(), None)
		.await
		.expect("Seeding the contended key should succeed.");

	let mut writers = Vec::new();

	for replacement in [b"60".to_vec(), b"40".to_vec()] {
		let store = store.clone();

		writers.push(tokio::spawn(async move {
			store.compare_and_swap("balance", Some(b"100"), replacement, None).await
		}));
	}

	let mut updates = 0;

	for writer in writers {
		let outcome = writer
			.await
			.expect("Writer task should not panic.")
			.expect("Conditional updates should not be backend failures.");

		if outcome.is_updated() {
			updates += 1;
		}
	}

	assert_eq!(updates, 1, "Both writers expected the same bytes; only one may win.");
}
