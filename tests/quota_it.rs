// std
use std::{sync::Arc, time::Duration};
// crates.io
use time::OffsetDateTime;
use tokio::time::Instant;
// self
use upstream_guard::{
	error::Error,
	key::OperationKey,
	policy::{OperationPolicy, PolicySet},
	quota::QuotaManager,
};

fn manager(policy: OperationPolicy) -> QuotaManager {
	QuotaManager::new(Arc::new(PolicySet::new(policy)))
}

fn operation() -> OperationKey {
	OperationKey::new("fetch-prices").expect("Operation fixture should be valid.")
}

#[tokio::test]
async fn cooldown_wait_shrinks_monotonically_until_expiry() {
	let manager = manager(OperationPolicy::default());
	let operation = operation();

	manager.record_exhausted(&operation, Some(Duration::from_secs(60)));

	let first = manager.check(&operation);

	assert!(!first.available);
	assert!(first.wait <= Duration::from_secs(60));
	assert!(first.resets_at.is_some());

	tokio::time::sleep(Duration::from_millis(50)).await;

	let second = manager.check(&operation);

	assert!(!second.available);
	assert!(second.wait < first.wait, "The reported wait must shrink as time passes.");
}

#[tokio::test]
async fn availability_returns_once_the_cooldown_elapses() {
	let manager = manager(OperationPolicy::default());
	let operation = operation();

	manager.record_exhausted(&operation, Some(Duration::from_millis(150)));
	assert!(!manager.check(&operation).available);

	let begun = Instant::now();

	manager
		.wait_until_available(&operation, None)
		.await
		.expect("Waiting out a short cooldown should succeed.");
	assert!(begun.elapsed() >= Duration::from_millis(140));
	assert!(manager.check(&operation).available);
}

#[tokio::test]
async fn daily_cap_reports_the_next_window_boundary() {
	let policy = OperationPolicy::builder()
		.daily_quota(2)
		.build()
		.expect("Daily-quota policy fixture should validate.");
	let manager = manager(policy);
	let operation = operation();

	manager.record_request(&operation);
	assert!(manager.check(&operation).available);
	manager.record_request(&operation);

	let status = manager.check(&operation);

	assert!(!status.available);

	let resets_at = status.resets_at.expect("A capped operation must report its reset instant.");
	let now = OffsetDateTime::now_utc();

	assert!(resets_at > now);
	assert!(resets_at - now <= time::Duration::hours(24));
	assert_eq!(resets_at.time(), time::Time::MIDNIGHT);
}

#[tokio::test]
async fn deadline_abandons_a_long_cooldown() {
	let manager = manager(OperationPolicy::default());
	let operation = operation();

	manager.record_exhausted(&operation, Some(Duration::from_secs(3_600)));

	let deadline = Instant::now() + Duration::from_millis(100);
	let result = manager.wait_until_available(&operation, Some(deadline)).await;

	assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
}
