//! Batch execution: cache short-circuit, chunking, classified retries, degradation.

// std
use std::collections::HashSet;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	breaker::CircuitBreaker,
	error::ProviderError,
	ext::{BatchExecutor, FallbackProvider},
	key::{OperationKey, OwnerId},
	obs::{self, GuardSpan},
	orchestrate::{
		BatchReport, BatchRequest, FailedItem, FailureKind, Orchestrator, Provenance,
		ResolvedItem, RetrySchedule,
	},
	policy::OperationPolicy,
	wait,
};

const DEADLINE_MESSAGE: &str = "The request deadline elapsed before this item was attempted.";
const NO_RESULT_MESSAGE: &str = "Provider returned no result for this item.";

enum ChunkFlow {
	Done,
	Deadline,
}

impl Orchestrator {
	/// Resolves a batch of identifiers through the guarded operation.
	///
	/// Per-item failures land in the report; the call itself fails only on a total
	/// inability to proceed, such as storage being unavailable. A deadline elapsing
	/// mid-run fails the remaining items softly instead of hanging or discarding
	/// completed work.
	pub async fn run_batch<T>(
		&self,
		request: BatchRequest,
		executor: &dyn BatchExecutor<T>,
	) -> Result<BatchReport<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		self.run(request, executor, None).await
	}

	/// Like [`run_batch`](Self::run_batch), with fallback estimates for items whose
	/// calls exhaust their retries. Estimated values carry
	/// [`Provenance::Estimated`] so consumers can tell them from real data.
	pub async fn run_batch_with_fallback<T>(
		&self,
		request: BatchRequest,
		executor: &dyn BatchExecutor<T>,
		fallback: &dyn FallbackProvider<T>,
	) -> Result<BatchReport<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		self.run(request, executor, Some(fallback)).await
	}

	async fn run<T>(
		&self,
		request: BatchRequest,
		executor: &dyn BatchExecutor<T>,
		fallback: Option<&dyn FallbackProvider<T>>,
	) -> Result<BatchReport<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		let operation = request.operation.clone();
		let span = GuardSpan::new(&operation, "run_batch");
		let result = span.instrument(self.run_inner(request, executor, fallback)).await;

		if let Ok(report) = &result {
			obs::batch_outcome(&operation, &report.tally());
		}

		result
	}

	async fn run_inner<T>(
		&self,
		request: BatchRequest,
		executor: &dyn BatchExecutor<T>,
		fallback: Option<&dyn FallbackProvider<T>>,
	) -> Result<BatchReport<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		let BatchRequest { operation, items, owner, bypass_cache, deadline } = request;
		let policy = self.policies.policy_for(&operation).clone();
		let dependency = policy.dependency_for(&operation);
		let breaker = self.breakers.breaker(&dependency, &policy.breaker);
		let mut report = BatchReport { successful: Vec::new(), failed: Vec::new() };
		let mut seen = HashSet::new();
		let mut pending = Vec::new();

		for id in items {
			if seen.insert(id.clone()) {
				pending.push(id);
			}
		}

		let mut to_fetch = Vec::new();

		if bypass_cache || policy.batch.cache_ttl.is_zero() {
			to_fetch = pending;
		} else {
			for id in pending {
				match self.cache.get::<T>(&operation, &id).await? {
					Some(value) => report.successful.push(ResolvedItem {
						id,
						value,
						provenance: Provenance::Cached,
					}),
					None => to_fetch.push(id),
				}
			}
		}

		let chunks: Vec<Vec<String>> =
			to_fetch.chunks(policy.batch.batch_size).map(<[String]>::to_vec).collect();
		let mut idx = 0;

		while idx < chunks.len() {
			let flow = self
				.resolve_chunk(
					&operation,
					owner.as_ref(),
					&policy,
					&breaker,
					&chunks[idx],
					executor,
					fallback,
					deadline,
					&mut report,
				)
				.await?;

			idx += 1;

			match flow {
				ChunkFlow::Deadline => break,
				ChunkFlow::Done =>
					if idx < chunks.len() && !policy.batch.batch_delay.is_zero() {
						// Extra safety margin beyond the rate limiter.
						match wait::sleep_for(
							"orchestrate.batch_delay",
							policy.batch.batch_delay,
							deadline,
						)
						.await
						{
							Ok(()) => {},
							Err(Error::DeadlineExceeded { .. }) => break,
							Err(e) => return Err(e),
						}
					},
			}
		}

		// Whatever was never reached fails softly instead of hanging past the deadline.
		for chunk in chunks.iter().skip(idx) {
			fail_chunk(&mut report, chunk, FailureKind::DeadlineExceeded, DEADLINE_MESSAGE);
		}

		Ok(report)
	}

	#[allow(clippy::too_many_arguments)]
	async fn resolve_chunk<T>(
		&self,
		operation: &OperationKey,
		owner: Option<&OwnerId>,
		policy: &OperationPolicy,
		breaker: &CircuitBreaker,
		chunk: &[String],
		executor: &dyn BatchExecutor<T>,
		fallback: Option<&dyn FallbackProvider<T>>,
		deadline: Option<Instant>,
		report: &mut BatchReport<T>,
	) -> Result<ChunkFlow>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		let mut schedule = RetrySchedule::new(policy.retry.clone());

		loop {
			match self.admit(operation, owner, policy, chunk.len(), deadline).await {
				Ok(()) => {},
				Err(Error::DeadlineExceeded { .. }) => {
					fail_chunk(report, chunk, FailureKind::DeadlineExceeded, DEADLINE_MESSAGE);

					return Ok(ChunkFlow::Deadline);
				},
				Err(e) => return Err(e),
			}

			self.quota.record_request(operation);

			match breaker.execute(executor.execute(operation, chunk)).await {
				Ok(pairs) => {
					self.settle(operation, policy, chunk, pairs, report).await?;

					return Ok(ChunkFlow::Done);
				},
				Err(Error::CircuitOpen { dependency, .. }) => {
					// Fast-fail path: waiting out the reset timeout would stall the
					// whole batch for an unhealthy dependency.
					degrade(
						report,
						fallback,
						operation,
						chunk,
						FailureKind::CircuitOpen,
						&format!("Circuit for `{dependency}` is open."),
					);

					return Ok(ChunkFlow::Done);
				},
				Err(Error::Provider(e)) => match e {
					ProviderError::QuotaExhausted { message, retry_after } => {
						self.quota.record_exhausted(operation, retry_after);

						if !schedule.try_consume() {
							degrade(
								report,
								fallback,
								operation,
								chunk,
								FailureKind::RetriesExhausted,
								&message,
							);

							return Ok(ChunkFlow::Done);
						}
						match self.quota.wait_until_available(operation, deadline).await {
							Ok(()) => {},
							Err(Error::DeadlineExceeded { .. }) => {
								fail_chunk(
									report,
									chunk,
									FailureKind::DeadlineExceeded,
									DEADLINE_MESSAGE,
								);

								return Ok(ChunkFlow::Deadline);
							},
							Err(e) => return Err(e),
						}
					},
					ProviderError::Transient { message, .. } => match schedule.next_delay() {
						Some(delay) =>
							match wait::sleep_for("orchestrate.backoff", delay, deadline).await {
								Ok(()) => {},
								Err(Error::DeadlineExceeded { .. }) => {
									fail_chunk(
										report,
										chunk,
										FailureKind::DeadlineExceeded,
										DEADLINE_MESSAGE,
									);

									return Ok(ChunkFlow::Deadline);
								},
								Err(e) => return Err(e),
							},
						None => {
							degrade(
								report,
								fallback,
								operation,
								chunk,
								FailureKind::RetriesExhausted,
								&message,
							);

							return Ok(ChunkFlow::Done);
						},
					},
					ProviderError::Permanent { message, .. } => {
						fail_chunk(report, chunk, FailureKind::Permanent, &message);

						return Ok(ChunkFlow::Done);
					},
				},
				Err(other) => return Err(other),
			}
		}
	}

	/// Clears every gate in front of one provider call: quota, durable budget, throttle.
	async fn admit(
		&self,
		operation: &OperationKey,
		owner: Option<&OwnerId>,
		policy: &OperationPolicy,
		chunk_len: usize,
		deadline: Option<Instant>,
	) -> Result<()> {
		self.quota.wait_until_available(operation, deadline).await?;

		if let (Some(ledger), Some(owner)) = (self.ledger.as_ref(), owner) {
			let cost = policy.batch.tokens_per_call * chunk_len as f64;

			ledger.consume(owner, cost, deadline).await?;
		}

		self.limiter.acquire(operation, deadline).await
	}

	async fn settle<T>(
		&self,
		operation: &OperationKey,
		policy: &OperationPolicy,
		chunk: &[String],
		pairs: Vec<(String, T)>,
		report: &mut BatchReport<T>,
	) -> Result<()>
	where
		T: Serialize + DeserializeOwned + Send + Sync,
	{
		let mut returned: HashMap<String, T> = pairs.into_iter().collect();

		for id in chunk {
			match returned.remove(id.as_str()) {
				Some(value) => {
					self.cache.put(operation, id, &value, policy.batch.cache_ttl).await?;
					report.successful.push(ResolvedItem {
						id: id.clone(),
						value,
						provenance: Provenance::Fresh,
					});
				},
				// The provider answered and chose not to return this item.
				None => report.failed.push(FailedItem {
					id: id.clone(),
					kind: FailureKind::Permanent,
					message: NO_RESULT_MESSAGE.to_owned(),
				}),
			}
		}

		Ok(())
	}
}

fn degrade<T>(
	report: &mut BatchReport<T>,
	fallback: Option<&dyn FallbackProvider<T>>,
	operation: &OperationKey,
	chunk: &[String],
	kind: FailureKind,
	message: &str,
) {
	for id in chunk {
		match fallback.and_then(|f| f.estimate(operation, id)) {
			Some(value) => report.successful.push(ResolvedItem {
				id: id.clone(),
				value,
				provenance: Provenance::Estimated,
			}),
			None => report.failed.push(FailedItem {
				id: id.clone(),
				kind,
				message: message.to_owned(),
			}),
		}
	}
}

fn fail_chunk<T>(report: &mut BatchReport<T>, chunk: &[String], kind: FailureKind, message: &str) {
	for id in chunk {
		report.failed.push(FailedItem { id: id.clone(), kind, message: message.to_owned() });
	}
}
