//! Daily-window quota accounting and provider-signalled cooldowns.
//!
//! The manager never throws on its own: `check` reports availability plus a
//! caller-actionable wait, and it is the orchestrator's decision whether to wait or
//! degrade. Daily counters reset at the start of each UTC calendar day, keyed off the
//! window's own start timestamp so repeated checks cannot drift the boundary.

// self
use crate::{
	_prelude::*,
	key::OperationKey,
	obs::{self, CooldownPhase},
	policy::PolicySet,
	wait,
};

/// Availability report produced by [`QuotaManager::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaStatus {
	/// Whether a request may proceed now.
	pub available: bool,
	/// Instant at which availability returns, when currently unavailable.
	pub resets_at: Option<OffsetDateTime>,
	/// Remaining wait; [`Duration::ZERO`] when available.
	pub wait: Duration,
}
impl QuotaStatus {
	fn available_now() -> Self {
		Self { available: true, resets_at: None, wait: Duration::ZERO }
	}

	fn unavailable_until(now: OffsetDateTime, until: OffsetDateTime) -> Self {
		Self { available: false, resets_at: Some(until), wait: wait_between(now, until) }
	}
}

#[derive(Clone, Debug)]
struct QuotaWindow {
	daily_count: u64,
	window_started_at: OffsetDateTime,
	cooldown_until: Option<OffsetDateTime>,
}
impl QuotaWindow {
	fn started(now: OffsetDateTime) -> Self {
		Self { daily_count: 0, window_started_at: now, cooldown_until: None }
	}

	/// Resets the counter when the UTC calendar day of the window's own start changed.
	fn roll(&mut self, now: OffsetDateTime) {
		if self.window_started_at.date() != now.date() {
			self.daily_count = 0;
			self.window_started_at = now;
		}
	}
}

/// Longer-window usage caps and cooldown bookkeeping, per operation key.
pub struct QuotaManager {
	policies: Arc<PolicySet>,
	windows: Mutex<HashMap<OperationKey, QuotaWindow>>,
}
impl QuotaManager {
	/// Creates a manager that reads daily caps and cooldown fallbacks from `policies`.
	pub fn new(policies: Arc<PolicySet>) -> Self {
		Self { policies, windows: Mutex::new(HashMap::new()) }
	}

	/// Reports whether `operation` may proceed, with the remaining wait when not.
	pub fn check(&self, operation: &OperationKey) -> QuotaStatus {
		let now = OffsetDateTime::now_utc();
		let policy = &self.policies.policy_for(operation).quota;
		let mut windows = self.windows.lock();
		let window = windows.entry(operation.clone()).or_insert_with(|| QuotaWindow::started(now));

		window.roll(now);

		// A reached daily cap holds until the next window boundary regardless of
		// cooldown state.
		if policy.daily_quota.is_some_and(|limit| window.daily_count >= limit) {
			return QuotaStatus::unavailable_until(now, next_day_start(now));
		}
		if let Some(until) = window.cooldown_until {
			if now < until {
				return QuotaStatus::unavailable_until(now, until);
			}

			window.cooldown_until = None;
			obs::cooldown(operation, CooldownPhase::Exited);
		}

		QuotaStatus::available_now()
	}

	/// Counts one request against the operation's daily window.
	pub fn record_request(&self, operation: &OperationKey) {
		let now = OffsetDateTime::now_utc();
		let mut windows = self.windows.lock();
		let window = windows.entry(operation.clone()).or_insert_with(|| QuotaWindow::started(now));

		window.roll(now);
		window.daily_count += 1;
	}

	/// Enters (or extends) a cooldown after the provider signalled exhaustion.
	///
	/// Falls back to the policy's `default_retry_after` when the provider gave no
	/// hint. An active cooldown only ever moves forward.
	pub fn record_exhausted(&self, operation: &OperationKey, retry_after: Option<Duration>) {
		let now = OffsetDateTime::now_utc();
		let policy = &self.policies.policy_for(operation).quota;
		let target = now + retry_after.unwrap_or(policy.default_retry_after);
		let mut windows = self.windows.lock();
		let window = windows.entry(operation.clone()).or_insert_with(|| QuotaWindow::started(now));
		let was_cooling = window.cooldown_until.is_some_and(|until| now < until);

		window.cooldown_until = Some(window.cooldown_until.map_or(target, |cur| cur.max(target)));

		if !was_cooling {
			obs::cooldown(operation, CooldownPhase::Entered);
		}
	}

	/// Suspends until [`check`](Self::check) reports availability.
	pub async fn wait_until_available(
		&self,
		operation: &OperationKey,
		deadline: Option<Instant>,
	) -> Result<()> {
		loop {
			let status = self.check(operation);

			if status.available {
				return Ok(());
			}

			wait::sleep_slice("quota.wait", status.wait, deadline).await?;
		}
	}
}

fn wait_between(now: OffsetDateTime, until: OffsetDateTime) -> Duration {
	(until - now).try_into().unwrap_or(Duration::ZERO)
}

fn next_day_start(now: OffsetDateTime) -> OffsetDateTime {
	now.date().next_day().unwrap_or(now.date()).midnight().assume_utc()
}
