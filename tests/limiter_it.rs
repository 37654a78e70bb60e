// std
use std::{sync::Arc, time::Duration};
// crates.io
use tokio::time::Instant;
// self
use upstream_guard::{
	error::Error,
	key::OperationKey,
	limiter::RateLimiter,
	policy::{OperationPolicy, PolicySet},
};

fn limiter(requests_per_second: f64, burst_capacity: u32) -> RateLimiter {
	let policy = OperationPolicy::builder()
		.requests_per_second(requests_per_second)
		.burst_capacity(burst_capacity)
		.build()
		.expect("Limiter policy fixture should validate.");

	RateLimiter::new(Arc::new(PolicySet::new(policy)))
}

fn operation() -> OperationKey {
	OperationKey::new("fetch-prices").expect("Operation fixture should be valid.")
}

#[tokio::test(start_paused = true)]
async fn grants_follow_the_configured_cadence() {
	let limiter = limiter(2.0, 2);
	let operation = operation();
	let begun = Instant::now();
	let mut grant_offsets_ms = Vec::new();

	for _ in 0..5 {
		limiter
			.acquire(&operation, None)
			.await
			.expect("Acquire without a deadline should always be granted.");
		grant_offsets_ms.push(begun.elapsed().as_millis() as i64);
	}

	// Burst of two up front, then one permit per 500 ms at 2 permits/second.
	for (granted, expected) in grant_offsets_ms.iter().zip([0, 0, 500, 1_000, 1_500]) {
		assert!(
			(granted - expected).abs() <= 5,
			"Grant at {granted} ms should land within 5 ms of {expected} ms.",
		);
	}
}

#[tokio::test(start_paused = true)]
async fn available_tokens_refills_lazily_and_clamps() {
	let limiter = limiter(2.0, 5);
	let operation = operation();

	assert_eq!(limiter.available_tokens(&operation), 5);

	for _ in 0..3 {
		limiter.acquire(&operation, None).await.expect("Burst acquires should be immediate.");
	}

	assert_eq!(limiter.available_tokens(&operation), 2);

	tokio::time::advance(Duration::from_secs(1)).await;
	assert_eq!(limiter.available_tokens(&operation), 4);

	// A long idle period cannot push the count past the burst ceiling.
	tokio::time::advance(Duration::from_secs(3_600)).await;
	assert_eq!(limiter.available_tokens(&operation), 5);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_arrival_order() {
	let limiter = Arc::new(limiter(10.0, 1));
	let operation = operation();
	let order = Arc::new(std::sync::Mutex::new(Vec::new()));
	let mut workers = Vec::new();

	for index in 0..4_u32 {
		let limiter = limiter.clone();
		let operation = operation.clone();
		let order = order.clone();

		workers.push(tokio::spawn(async move {
			// Stagger arrivals so the queue order is deterministic.
			tokio::time::sleep(Duration::from_millis(10 * (u64::from(index) + 1))).await;
			limiter
				.acquire(&operation, None)
				.await
				.expect("Queued acquire should eventually be granted.");
			order.lock().expect("Order lock should not be poisoned.").push(index);
		}));
	}

	for worker in workers {
		worker.await.expect("Worker task should not panic.");
	}

	assert_eq!(*order.lock().expect("Order lock should not be poisoned."), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn deadline_abandons_a_stuck_wait() {
	let limiter = limiter(0.1, 1);
	let operation = operation();

	limiter.acquire(&operation, None).await.expect("The burst permit should be immediate.");

	let begun = Instant::now();
	let deadline = begun + Duration::from_millis(300);
	let result = limiter.acquire(&operation, Some(deadline)).await;

	assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
	// The wait was abandoned at the deadline, not after the 10-second refill.
	assert!(begun.elapsed() < Duration::from_secs(1));
}
