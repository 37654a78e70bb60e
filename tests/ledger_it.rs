// std
use std::{env, fs, process, sync::Arc, time::Duration};
// crates.io
use time::OffsetDateTime;
use tokio::time::Instant;
// self
use upstream_guard::{
	error::Error,
	key::OwnerId,
	ledger::TokenLedger,
	policy::LedgerPolicy,
	store::{FileStore, KvStore, MemoryStore},
};

fn owner() -> OwnerId {
	OwnerId::new("acct-1").expect("Owner fixture should be valid.")
}

fn policy(max_tokens: f64, tokens_per_minute: f64) -> LedgerPolicy {
	LedgerPolicy::new(max_tokens, tokens_per_minute)
		.expect("Ledger policy fixture should validate.")
}

#[tokio::test]
async fn entries_are_created_lazily_at_full_balance() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let ledger = TokenLedger::new(store, policy(100.0, 60.0));
	let available = ledger
		.available_tokens(&owner())
		.await
		.expect("Reading a fresh owner should create its entry.");

	assert_eq!(available, 100.0);
}

#[tokio::test]
async fn balance_is_shared_across_ledger_instances() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let first = TokenLedger::new(store.clone(), policy(100.0, 60.0));
	let owner = owner();

	first.consume(&owner, 30.0, None).await.expect("Consuming within the balance should succeed.");

	// A separate instance over the same store models a separate invocation.
	let second = TokenLedger::new(store, policy(100.0, 60.0));
	let available = second
		.available_tokens(&owner)
		.await
		.expect("A second instance should read the shared entry.");

	assert!(available <= 70.5, "Second instance observed {available}, expected about 70.");
	assert!(available >= 69.5, "Second instance observed {available}, expected about 70.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_never_overdraw() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	// 6000 tokens/minute = 100/second, so the losing consumer's wait stays short.
	let ledger = Arc::new(TokenLedger::new(store, policy(100.0, 6_000.0)));
	let owner = owner();

	ledger.available_tokens(&owner).await.expect("Entry creation should succeed.");

	let mut consumers = Vec::new();

	for _ in 0..2 {
		let ledger = ledger.clone();
		let owner = owner.clone();

		consumers.push(tokio::spawn(async move { ledger.consume(&owner, 60.0, None).await }));
	}

	for consumer in consumers {
		consumer
			.await
			.expect("Consumer task should not panic.")
			.expect("Both consumers must eventually be satisfied.");
	}

	let available = ledger
		.available_tokens(&owner)
		.await
		.expect("Reading the final balance should succeed.");

	// 120 tokens were spent against a 100-token balance; the race loser waited for
	// the refill instead of driving the balance negative.
	assert!(available >= 0.0, "Balance went negative: {available}.");
	assert!(available < 30.0, "Both consumers must actually have spent: {available}.");
}

#[tokio::test]
async fn wait_time_reflects_the_shortfall() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let ledger = TokenLedger::new(store, policy(10.0, 60.0));
	let owner = owner();

	ledger.consume(&owner, 10.0, None).await.expect("Draining the balance should succeed.");

	let wait = ledger
		.wait_time(&owner, 6.0)
		.await
		.expect("Estimating the wait should succeed.");

	// 6 tokens short at 60 tokens/minute is about 6 seconds away.
	assert!(wait >= Duration::from_millis(5_500), "Estimated {wait:?}.");
	assert!(wait <= Duration::from_millis(6_500), "Estimated {wait:?}.");
}

#[tokio::test]
async fn deadline_abandons_an_unaffordable_wait() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let ledger = TokenLedger::new(store, policy(10.0, 1.0));
	let owner = owner();

	ledger.consume(&owner, 10.0, None).await.expect("Draining the balance should succeed.");

	let deadline = Instant::now() + Duration::from_millis(100);
	let result = ledger.consume(&owner, 5.0, Some(deadline)).await;

	assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
}

#[tokio::test]
async fn demands_beyond_capacity_are_rejected_up_front() {
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let ledger = TokenLedger::new(store, policy(10.0, 60.0));
	let result = ledger.consume(&owner(), 11.0, None).await;

	assert!(matches!(result, Err(Error::Policy(_))));
}

#[tokio::test]
async fn balance_survives_process_restarts() {
	let path = env::temp_dir().join(format!(
		"upstream_guard_ledger_it_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	));

	{
		let store: Arc<dyn KvStore> =
			Arc::new(FileStore::open(&path).expect("Opening the file store should succeed."));
		let ledger = TokenLedger::new(store, policy(100.0, 60.0));

		ledger
			.consume(&owner(), 40.0, None)
			.await
			.expect("Consuming within the balance should succeed.");
	}

	// Reopening the snapshot models a fresh process sharing the same durable state.
	let store: Arc<dyn KvStore> =
		Arc::new(FileStore::open(&path).expect("Reopening the file store should succeed."));
	let ledger = TokenLedger::new(store, policy(100.0, 60.0));
	let available = ledger
		.available_tokens(&owner())
		.await
		.expect("Reading the reopened balance should succeed.");

	assert!(available <= 60.5, "Reopened balance was {available}, expected about 60.");
	assert!(available >= 59.5, "Reopened balance was {available}, expected about 60.");

	fs::remove_file(&path).unwrap_or_else(|e| {
		panic!("Failed to remove temporary ledger snapshot {}: {e}", path.display())
	});
}
