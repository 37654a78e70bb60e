//! Bounded suspension helpers shared by every waiting component.

// self
use crate::_prelude::*;

/// Longest single sleep before a waiter re-evaluates its condition.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Sleeps for at most one slice of `wait`, bounded by `deadline`.
///
/// Returns [`Error::DeadlineExceeded`] when the deadline has already passed; otherwise
/// sleeps `min(wait, WAIT_SLICE, time-to-deadline)` and returns so the caller can
/// re-evaluate its condition. Every suspension point in the crate loops over this
/// helper; nothing sleeps unbounded.
pub(crate) async fn sleep_slice(
	stage: &'static str,
	wait: Duration,
	deadline: Option<Instant>,
) -> Result<()> {
	let now = Instant::now();
	let mut slice = wait.min(WAIT_SLICE).max(Duration::from_millis(1));

	if let Some(deadline) = deadline {
		if now >= deadline {
			return Err(Error::DeadlineExceeded { stage });
		}

		slice = slice.min(deadline - now);
	}

	tokio::time::sleep(slice).await;

	Ok(())
}

/// Sleeps for the whole of `total`, slice by slice, bounded by `deadline`.
pub(crate) async fn sleep_for(
	stage: &'static str,
	total: Duration,
	deadline: Option<Instant>,
) -> Result<()> {
	let until = Instant::now() + total;

	loop {
		let now = Instant::now();

		if now >= until {
			return Ok(());
		}

		sleep_slice(stage, until - now, deadline).await?;
	}
}
