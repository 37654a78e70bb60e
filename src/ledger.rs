//! Durable, replenishing token ledger shared across processes and invocations.
//!
//! Balances are keyed by owner and persisted through [`KvStore`], so short-lived and
//! concurrent callers all spend from the same pool. Consumption is never a plain
//! read-then-write: the ledger compare-and-swaps the exact bytes it loaded, and a
//! lost race reconciles from the bytes the store hands back and retries. Entries are
//! created lazily with policy defaults and never deleted.

// self
use crate::{
	_prelude::*,
	key::OwnerId,
	policy::{LedgerPolicy, PolicyError},
	store::{CasOutcome, KvStore, StoreError},
	wait,
};

/// Durable per-owner balance, persisted as RFC 3339-stamped JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
	/// Tokens currently spendable.
	pub available_tokens: f64,
	/// Balance ceiling the entry replenishes toward.
	pub max_tokens: f64,
	/// Replenishment rate.
	pub tokens_per_minute: f64,
	/// Instant of the last refill computation.
	#[serde(with = "time::serde::rfc3339")]
	pub last_refill_at: OffsetDateTime,
}
impl LedgerEntry {
	fn fresh(policy: &LedgerPolicy, now: OffsetDateTime) -> Self {
		Self {
			available_tokens: policy.max_tokens,
			max_tokens: policy.max_tokens,
			tokens_per_minute: policy.tokens_per_minute,
			last_refill_at: now,
		}
	}

	/// Applies the lazy refill: `min(max, available + elapsed_minutes * rate)`.
	///
	/// A wall clock that stepped backwards grants nothing and leaves the stamp
	/// untouched, so the skipped span is not credited twice later.
	pub fn refill(&mut self, now: OffsetDateTime) {
		if now <= self.last_refill_at {
			return;
		}

		let elapsed_minutes = (now - self.last_refill_at).as_seconds_f64() / 60.0;

		self.available_tokens = (self.available_tokens
			+ elapsed_minutes * self.tokens_per_minute)
			.min(self.max_tokens);
		self.last_refill_at = now;
	}

	/// Time until `amount` tokens are spendable, derived from the shortfall.
	pub fn wait_for(&self, amount: f64) -> Duration {
		let shortfall = amount - self.available_tokens;

		if shortfall <= 0.0 {
			return Duration::ZERO;
		}

		let millis = (shortfall / self.tokens_per_minute * 60_000.0).ceil() as u64;

		Duration::from_millis(millis.max(1))
	}
}

#[derive(Clone)]
struct CachedEntry {
	raw: Vec<u8>,
	entry: LedgerEntry,
	loaded_at: Instant,
}

/// Durable, replenishing token balance shared by concurrent and cross-process callers.
pub struct TokenLedger {
	store: Arc<dyn KvStore>,
	policy: LedgerPolicy,
	cached: Mutex<HashMap<OwnerId, CachedEntry>>,
}
impl TokenLedger {
	/// Creates a ledger over `store`, seeding new entries from `policy`.
	pub fn new(store: Arc<dyn KvStore>, policy: LedgerPolicy) -> Self {
		Self { store, policy, cached: Mutex::new(HashMap::new()) }
	}

	/// Returns the owner's current lazily-refilled balance without consuming.
	pub async fn available_tokens(&self, owner: &OwnerId) -> Result<f64> {
		let loaded = self.load(owner, false).await?;
		let mut entry = loaded.entry;

		entry.refill(OffsetDateTime::now_utc());

		Ok(entry.available_tokens)
	}

	/// Estimates how long the owner must wait before `amount` tokens are spendable.
	pub async fn wait_time(&self, owner: &OwnerId, amount: f64) -> Result<Duration> {
		let loaded = self.load(owner, false).await?;
		let mut entry = loaded.entry;

		entry.refill(OffsetDateTime::now_utc());

		Ok(entry.wait_for(amount))
	}

	/// Suspends until `amount` tokens were atomically deducted from the balance.
	///
	/// The deduction is a storage-layer conditional update; two concurrent consumers
	/// summing past the balance can never drive it negative—the loser of the race
	/// reloads and either retries or waits out its shortfall.
	pub async fn consume(
		&self,
		owner: &OwnerId,
		amount: f64,
		deadline: Option<Instant>,
	) -> Result<()> {
		if amount <= 0.0 {
			return Ok(());
		}
		if amount > self.policy.max_tokens {
			return Err(PolicyError::LedgerDemandExceedsCapacity {
				requested: amount,
				capacity: self.policy.max_tokens,
			}
			.into());
		}

		let key = Self::storage_key(owner);
		let mut force = false;

		loop {
			let loaded = self.load(owner, force).await?;
			let mut entry = loaded.entry.clone();

			entry.refill(OffsetDateTime::now_utc());

			if entry.available_tokens >= amount {
				entry.available_tokens -= amount;

				let replacement = encode(&entry)?;

				match self
					.store
					.compare_and_swap(&key, Some(&loaded.raw), replacement.clone(), None)
					.await?
				{
					CasOutcome::Updated => {
						self.store_cached(owner, replacement, entry);

						return Ok(());
					},
					CasOutcome::Mismatch { current } => {
						// Lost the race; reconcile from what the store handed back
						// instead of paying another read.
						match current {
							Some(bytes) => {
								let entry = decode(&bytes)?;

								self.store_cached(owner, bytes, entry);
							},
							None => self.invalidate(owner),
						}

						force = false;
					},
				}
			} else {
				wait::sleep_slice("ledger.consume", entry.wait_for(amount), deadline).await?;

				// The balance may have been refilled or spent elsewhere meanwhile.
				force = true;
			}
		}
	}

	async fn load(&self, owner: &OwnerId, force: bool) -> Result<CachedEntry> {
		if !force {
			let cached = self.cached.lock();
			let fresh_hit = cached
				.get(owner)
				.filter(|hit| hit.loaded_at.elapsed() <= self.policy.cache_ttl);

			if let Some(hit) = fresh_hit {
				return Ok(hit.clone());
			}
		}

		let key = Self::storage_key(owner);

		loop {
			match self.store.get(&key).await? {
				Some(bytes) => {
					let entry = decode(&bytes)?;
					let loaded =
						CachedEntry { raw: bytes, entry, loaded_at: Instant::now() };

					self.cached.lock().insert(owner.clone(), loaded.clone());

					return Ok(loaded);
				},
				None => {
					// Lazy creation; a concurrent creator winning the race is fine,
					// the next get observes its entry.
					let entry = LedgerEntry::fresh(&self.policy, OffsetDateTime::now_utc());
					let bytes = encode(&entry)?;

					if self
						.store
						.compare_and_swap(&key, None, bytes.clone(), None)
						.await?
						.is_updated()
					{
						let loaded =
							CachedEntry { raw: bytes, entry, loaded_at: Instant::now() };

						self.cached.lock().insert(owner.clone(), loaded.clone());

						return Ok(loaded);
					}
				},
			}
		}
	}

	fn store_cached(&self, owner: &OwnerId, raw: Vec<u8>, entry: LedgerEntry) {
		self.cached
			.lock()
			.insert(owner.clone(), CachedEntry { raw, entry, loaded_at: Instant::now() });
	}

	fn invalidate(&self, owner: &OwnerId) {
		self.cached.lock().remove(owner);
	}

	fn storage_key(owner: &OwnerId) -> String {
		format!("ledger/{owner}")
	}
}

fn encode(entry: &LedgerEntry) -> Result<Vec<u8>> {
	serde_json::to_vec(entry).map_err(|e| {
		StoreError::Serialization { message: format!("Failed to serialize ledger entry: {e}") }
			.into()
	})
}

fn decode(bytes: &[u8]) -> Result<LedgerEntry> {
	serde_json::from_slice(bytes).map_err(|e| {
		StoreError::Serialization { message: format!("Failed to parse ledger entry: {e}") }.into()
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::Duration as TimeDuration;
	// self
	use super::*;

	fn entry(available: f64) -> LedgerEntry {
		LedgerEntry {
			available_tokens: available,
			max_tokens: 100.0,
			tokens_per_minute: 60.0,
			last_refill_at: OffsetDateTime::now_utc(),
		}
	}

	#[test]
	fn refill_is_linear_and_clamped() {
		let mut entry = entry(10.0);
		let later = entry.last_refill_at + TimeDuration::seconds(30);

		entry.refill(later);
		assert!((entry.available_tokens - 40.0).abs() < 1e-6);

		let much_later = entry.last_refill_at + TimeDuration::hours(10);

		entry.refill(much_later);
		assert_eq!(entry.available_tokens, 100.0);
	}

	#[test]
	fn refill_ignores_clock_regressions() {
		let mut entry = entry(10.0);
		let earlier = entry.last_refill_at - TimeDuration::minutes(5);

		entry.refill(earlier);
		assert_eq!(entry.available_tokens, 10.0);
	}

	#[test]
	fn wait_is_derived_from_the_shortfall() {
		let entry = entry(2.0);

		assert_eq!(entry.wait_for(2.0), Duration::ZERO);
		// 1 token short at 60/minute is one second away.
		assert_eq!(entry.wait_for(3.0), Duration::from_secs(1));
	}

	#[test]
	fn entries_round_trip_through_json() {
		let entry = entry(42.5);
		let bytes = encode(&entry).expect("Ledger entry should serialize.");
		let parsed = decode(&bytes).expect("Serialized ledger entry should parse.");

		assert_eq!(parsed, entry);
	}
}
