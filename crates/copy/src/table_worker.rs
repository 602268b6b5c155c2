// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Table-Copy Worker: streams one table partition from
//! source to target using the row-copy protocol, with no intermediate
//! file.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use pgferry_catalog::CatalogStore;
use pgferry_core::guc;
use pgferry_core::model::{Lifecycle, SourceObjectKind};
use pgferry_queue::{Consumer, Job, Producer};
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::session::{open_source_session, open_target_session};

/// Configuration a table-copy worker pool shares across its members.
#[derive(Debug, Clone)]
pub struct TableWorkerConfig {
	pub source_pguri: Arc<str>,
	pub target_pguri: Arc<str>,
	pub snapshot_id: Arc<str>,
	pub same_table_concurrency: bool,
	pub fail_fast: bool,
}

/// Runs one table-copy worker to completion: drains `copy_queue` until it is
/// closed or the run is cancelled, streaming each job's partition and, once
/// a table's last partition finishes, enqueuing that table's indexes onto
/// `index_queue`.
#[instrument(skip_all, fields(worker_id))]
pub async fn run_table_copy_worker(
	worker_id: usize,
	copy_queue: Consumer<Job>,
	index_queue: Producer<Job>,
	catalog: Arc<CatalogStore>,
	config: TableWorkerConfig,
	token: pgferry_core::CancellationToken,
) -> Result<()> {
	loop {
		let queue = copy_queue.clone();
		let wait_token = token.clone();
		let job = tokio::task::spawn_blocking(move || queue.blocking_receive(&wait_token))
			.await
			.expect("copy queue receive task panicked");
		let Some(job) = job else {
			info!(worker_id, "copy queue drained; worker exiting");
			return Ok(());
		};

		if let Err(error) = copy_one_partition(&catalog, &index_queue, &config, job).await {
			error!(worker_id, table_oid = job.object.0, %error, "partition copy failed");
			let part_number = job.partition.unwrap_or(0);
			let _ = catalog.mark_partition_lifecycle(job.object, part_number, Lifecycle::Failed);
			let _ = catalog.mark_lifecycle(SourceObjectKind::Table, job.object, Lifecycle::Failed, Some(&error.to_string()));
			if config.fail_fast {
				warn!(worker_id, "fail-fast: signalling run cancellation");
				token.cancel();
				return Err(error);
			}
		}
	}
}

async fn copy_one_partition(
	catalog: &CatalogStore,
	index_queue: &Producer<Job>,
	config: &TableWorkerConfig,
	job: Job,
) -> Result<()> {
	let table_oid = job.object;
	let part_number = job.partition.unwrap_or(0);

	let object = catalog
		.get_source_object(SourceObjectKind::Table, table_oid)?
		.ok_or_else(|| Error::UnknownObject(format!("table {}", table_oid.0)))?;
	let partition = catalog
		.list_partitions(table_oid)?
		.into_iter()
		.find(|p| p.part_number == part_number)
		.ok_or_else(|| Error::UnknownObject(format!("partition {}/{}", table_oid.0, part_number)))?;

	let source = open_source_session(&config.source_pguri, &config.snapshot_id).await?;
	let target = open_target_session(&config.target_pguri, config.same_table_concurrency).await?;

	let qualified = object.qualified_name.quoted();
	target.batch_execute(&guc::disable_triggers(&qualified)).await.map_err(Error::Target)?;

	// Exactly one partition per table truncates, and it is always the
	// first one to start, so a resumed run re-seeds the
	// table without double-truncating a partition that already ran.
	if partition.is_truncating_partition() {
		target.batch_execute(&format!("TRUNCATE {qualified}")).await.map_err(Error::Target)?;
	}

	let where_clause = partition.predicate.where_clause();
	let select = match &where_clause {
		Some(predicate) => format!("COPY (SELECT * FROM {qualified} WHERE {predicate}) TO STDOUT"),
		None => format!("COPY (SELECT * FROM {qualified}) TO STDOUT"),
	};
	let copy_in = format!("COPY {qualified} FROM STDIN");

	stream_copy(&source, &select, &target, &copy_in).await?;

	target.batch_execute(&guc::enable_triggers(&qualified)).await.map_err(Error::Target)?;

	catalog.mark_partition_lifecycle(table_oid, part_number, Lifecycle::Done)?;

	if catalog.all_partitions_done(table_oid)? {
		catalog.mark_lifecycle(SourceObjectKind::Table, table_oid, Lifecycle::Done, None)?;
		for index in catalog.list_indexes_for_table(table_oid)? {
			// The producer side is the supervisor's; a `Closed` error here
			// means the run is already shutting down.
			let _ = index_queue.send(Job::create_index(index.oid));
		}
	}
	Ok(())
}

/// Streams the row-copy protocol chunk-by-chunk from `source` to `target`
/// with no intermediate buffering beyond what's needed to forward each
/// chunk, with no intermediate file.
async fn stream_copy(
	source: &tokio_postgres::Client,
	select: &str,
	target: &tokio_postgres::Client,
	copy_in: &str,
) -> Result<()> {
	let mut out_stream = source.copy_out(select).await.map_err(Error::Source)?;
	let mut sink = target.copy_in(copy_in).await.map_err(Error::Target)?;

	while let Some(chunk) = out_stream.next().await {
		let chunk = chunk.map_err(|e| Error::CopyStream(e.to_string()))?;
		sink.send(chunk).await.map_err(Error::Target)?;
	}
	sink.close().await.map_err(Error::Target)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_is_cheaply_cloneable_for_worker_pools() {
		let config = TableWorkerConfig {
			source_pguri: Arc::from("postgres://source"),
			target_pguri: Arc::from("postgres://target"),
			snapshot_id: Arc::from("00000003-1"),
			same_table_concurrency: false,
			fail_fast: true,
		};
		let cloned = config.clone();
		assert_eq!(cloned.fail_fast, config.fail_fast);
	}
}
