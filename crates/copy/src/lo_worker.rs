// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Large-Object Worker: streams one binary large object
//! at a time from source to target, preserving its numeric identifier.
//! Workers are only spawned when the source reports at least one LO.

use std::sync::Arc;

use pgferry_catalog::CatalogStore;
use pgferry_core::ids::Oid;
use pgferry_core::model::{Lifecycle, SourceObjectKind};
use pgferry_queue::{Consumer, Job};
use tokio_postgres::NoTls;
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};

/// Bit flags understood by `lo_open`: `INV_READ` (0x4_0000) and `INV_WRITE`
/// (0x2_0000), matching the server's own `libpq-fs.h` constants.
const INV_READ: i32 = 0x0004_0000;
const INV_WRITE: i32 = 0x0002_0000;

/// Chunk size for each `loread`/`lowrite` round trip.
const CHUNK_BYTES: i32 = 256 * 1024;

#[derive(Debug, Clone)]
pub struct LargeObjectWorkerConfig {
	pub source_pguri: Arc<str>,
	pub target_pguri: Arc<str>,
	pub snapshot_id: Arc<str>,
	pub fail_fast: bool,
}

#[instrument(skip_all, fields(worker_id))]
pub async fn run_large_object_worker(
	worker_id: usize,
	lo_queue: Consumer<Job>,
	catalog: Arc<CatalogStore>,
	config: LargeObjectWorkerConfig,
	token: pgferry_core::CancellationToken,
) -> Result<()> {
	loop {
		let queue = lo_queue.clone();
		let wait_token = token.clone();
		let job = tokio::task::spawn_blocking(move || queue.blocking_receive(&wait_token))
			.await
			.expect("large object queue receive task panicked");
		let Some(job) = job else {
			info!(worker_id, "large object queue drained; worker exiting");
			return Ok(());
		};

		if let Err(error) = copy_one_large_object(&config, job.object).await {
			error!(worker_id, lo_oid = job.object.0, %error, "large object copy failed");
			let _ =
				catalog.mark_lifecycle(SourceObjectKind::LargeObject, job.object, Lifecycle::Failed, Some(&error.to_string()));
			if config.fail_fast {
				warn!(worker_id, "fail-fast: signalling run cancellation");
				token.cancel();
				return Err(error);
			}
			continue;
		}
		catalog.mark_lifecycle(SourceObjectKind::LargeObject, job.object, Lifecycle::Done, None)?;
	}
}

async fn copy_one_large_object(config: &LargeObjectWorkerConfig, lo_oid: Oid) -> Result<()> {
	let (source, connection) = tokio_postgres::connect(&config.source_pguri, NoTls).await.map_err(Error::Source)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(?error, "large object worker source session ended with an error");
		}
	});
	pgferry_snapshot::import(&source, &config.snapshot_id).await?;

	let (target, connection) = tokio_postgres::connect(&config.target_pguri, NoTls).await.map_err(Error::Target)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(?error, "large object worker target session ended with an error");
		}
	});

	target.batch_execute("BEGIN").await.map_err(Error::Target)?;
	target
		.execute("SELECT lo_create($1)", &[&(lo_oid.0 as i64 as i32)])
		.await
		.map_err(Error::Target)?;
	let write_fd: i32 = target
		.query_one("SELECT lo_open($1, $2)", &[&(lo_oid.0 as i32), &INV_WRITE])
		.await
		.map_err(Error::Target)?
		.get(0);

	let read_fd: i32 = source
		.query_one("SELECT lo_open($1, $2)", &[&(lo_oid.0 as i32), &INV_READ])
		.await
		.map_err(Error::Source)?
		.get(0);

	loop {
		let chunk: Vec<u8> =
			source.query_one("SELECT loread($1, $2)", &[&read_fd, &CHUNK_BYTES]).await.map_err(Error::Source)?.get(0);
		if chunk.is_empty() {
			break;
		}
		target.execute("SELECT lowrite($1, $2)", &[&write_fd, &chunk]).await.map_err(Error::Target)?;
	}

	source.execute("SELECT lo_close($1)", &[&read_fd]).await.map_err(Error::Source)?;
	target.execute("SELECT lo_close($1)", &[&write_fd]).await.map_err(Error::Target)?;
	target.batch_execute("COMMIT").await.map_err(Error::Target)?;

	Ok(())
}
