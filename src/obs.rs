//! Optional observability sinks for guard events.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `upstream_guard.batch` plus
//!   events for breaker transitions, cooldown changes, and batch outcomes.
//! - Enable `metrics` to increment `upstream_guard_*` counters for the same events.
//!
//! Both sinks are side effects only; nothing here is required for correctness.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{
	_prelude::*,
	breaker::BreakerState,
	key::{DependencyName, OperationKey},
	orchestrate::BatchTally,
};

/// Cooldown lifecycle phases reported to the event sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CooldownPhase {
	/// A cooldown started after the provider signalled exhaustion.
	Entered,
	/// An expired cooldown was observed and cleared.
	Exited,
}
impl CooldownPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CooldownPhase::Entered => "entered",
			CooldownPhase::Exited => "exited",
		}
	}
}
impl Display for CooldownPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reports a breaker state transition on every enabled sink.
pub fn breaker_transition(dependency: &DependencyName, from: BreakerState, to: BreakerState) {
	trace_breaker_transition(dependency, from, to);
	record_breaker_transition(dependency, to);
}

/// Reports a cooldown phase change on every enabled sink.
pub fn cooldown(operation: &OperationKey, phase: CooldownPhase) {
	trace_cooldown(operation, phase);
	record_cooldown(operation, phase);
}

/// Reports a completed batch's partitioned outcome on every enabled sink.
pub fn batch_outcome(operation: &OperationKey, tally: &BatchTally) {
	trace_batch_outcome(operation, tally);
	record_batch_outcome(operation, tally);
}
