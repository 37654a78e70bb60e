//! Rust’s turnkey upstream resilience guard—per-operation token buckets, circuit breakers,
//! quota cooldowns, and CAS-smart durable token ledgers in one crate built for production.
//!
//! The crate protects workflows that call rate-limited, quota-constrained, occasionally
//! unreliable external APIs. Callers compose the pieces at their composition root:
//!
//! - [`limiter::RateLimiter`] — per-operation token buckets with FIFO admission.
//! - [`quota::QuotaManager`] — daily caps and provider-signalled cooldowns.
//! - [`breaker::BreakerRegistry`] — named circuit breakers guarding each dependency.
//! - [`ledger::TokenLedger`] — a durable, replenishing token balance shared across
//!   processes through an atomic conditional update at the storage layer.
//! - [`orchestrate::Orchestrator`] — batching, retry, caching, and graceful degradation
//!   on top of all of the above.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod breaker;
pub mod cache;
pub mod error;
pub mod ext;
pub mod key;
pub mod ledger;
pub mod limiter;
pub mod obs;
pub mod orchestrate;
pub mod policy;
pub mod quota;
pub mod store;

mod wait;

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;

	pub use crate::error::{Error, Result};
}

pub use tokio;
