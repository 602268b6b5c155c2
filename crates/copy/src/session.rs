// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Session setup shared by every worker kind: one persisted source session
//! importing the shared snapshot, one persisted target session with the
//! bulk-load GUCs applied.

use pgferry_core::guc;
use tokio_postgres::{Client, NoTls};

use crate::error::{Error, Result};

/// Opens a source session and imports the shared snapshot into a read-only
/// transaction, so every row this session reads matches the point-in-time
/// every other worker observes.
pub async fn open_source_session(pguri: &str, snapshot_id: &str) -> Result<Client> {
	let (client, connection) = tokio_postgres::connect(pguri, NoTls).await.map_err(Error::Source)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(?error, "source session connection task ended with an error");
		}
	});
	pgferry_snapshot::import(&client, snapshot_id).await?;
	Ok(client)
}

/// Opens a target session and applies the bulk-load GUCs of /// (zero statement/lock timeouts, and `synchronous_commit = off` unless
/// same-table concurrency is in play).
pub async fn open_target_session(pguri: &str, same_table_concurrency: bool) -> Result<Client> {
	let (client, connection) = tokio_postgres::connect(pguri, NoTls).await.map_err(Error::Target)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(?error, "target session connection task ended with an error");
		}
	});
	for guc in guc::bulk_load_session_gucs(same_table_concurrency) {
		client.batch_execute(guc).await.map_err(Error::Target)?;
	}
	Ok(client)
}
