// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Spawns a worker pool as a `JoinSet`, matching the "asynchronous
//! polling of worker exit status": the supervisor awaits the set and reacts
//! to each worker's outcome as it lands rather than blocking on any one of
//! them.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::error;

use crate::error::Result;

/// Spawns `count` copies of `make_worker(worker_id)` into `joinset`. The
/// caller drives `joinset` to completion (or partial completion, on
/// cancellation) and decides how to react to failures.
pub fn spawn_pool<F, Fut>(joinset: &mut JoinSet<Result<()>>, count: usize, make_worker: F)
where
	F: Fn(usize) -> Fut,
	Fut: Future<Output = Result<()>> + Send + 'static,
{
	for worker_id in 0..count {
		joinset.spawn(make_worker(worker_id));
	}
}

/// Drains `joinset`, logging (but not stopping on) individual worker
/// failures; returns the first error encountered, if any, after every
/// worker has finished. This matches the non-`--fail-fast` behavior: a
/// failed job is recorded and the worker moves on, but the run as a whole
/// still reports failure at the end.
pub async fn join_pool(mut joinset: JoinSet<Result<()>>) -> Result<()> {
	let mut first_error = None;
	while let Some(outcome) = joinset.join_next().await {
		match outcome {
			Ok(Ok(())) => {}
			Ok(Err(error)) => {
				error!(%error, "worker exited with an error");
				first_error.get_or_insert(error);
			}
			Err(join_error) => {
				error!(%join_error, "worker task panicked");
			}
		}
	}
	match first_error {
		Some(error) => Err(error),
		None => Ok(()),
	}
}
