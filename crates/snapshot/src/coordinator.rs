// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Snapshot Coordinator: exports one serializable
//! deferrable read-only snapshot on the source and keeps its exporting
//! session alive for the whole run, so every worker that imports the
//! identifier observes the same point-in-time.

use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};

/// How often the keep-alive task pings the exporting session so it is never
/// reclaimed as idle while dependent workers are still importing.
const KEEP_ALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(20);

/// Holds the long-lived session that exported the snapshot. Dropping this
/// (or aborting [`SnapshotCoordinator::keep_alive`]) ends the transaction and
/// invalidates the snapshot identifier for any worker that has not yet
/// imported it.
pub struct SnapshotCoordinator {
	client: Client,
	snapshot_id: String,
	keep_alive_task: Option<JoinHandle<()>>,
}

impl SnapshotCoordinator {
	/// Opens a new session on `pguri`, begins `SERIALIZABLE, READ ONLY,
	/// DEFERRABLE`, and exports the snapshot. The returned coordinator owns
	/// the session and transaction until it is dropped.
	#[instrument(skip(pguri), level = "info")]
	pub async fn export(pguri: &str) -> Result<Self> {
		let (client, connection) = tokio_postgres::connect(pguri, NoTls).await.map_err(Error::Connect)?;
		tokio::spawn(async move {
			if let Err(error) = connection.await {
				warn!(%error, "snapshot export connection closed with an error");
			}
		});

		client
			.batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE")
			.await
			.map_err(Error::Export)?;

		let row = client.query_one("SELECT pg_export_snapshot()", &[]).await.map_err(Error::Export)?;
		let snapshot_id: String = row.get(0);
		info!(snapshot_id, "exported shared snapshot");

		Ok(Self { client, snapshot_id, keep_alive_task: None })
	}

	/// The identifier to hand to [`distribute`](Self::distribute).
	pub fn snapshot_id(&self) -> &str {
		&self.snapshot_id
	}

	/// Makes the identifier available to the rest of the run, flowing
	/// through the Catalog Store; the coordinator itself is
	/// storage-agnostic and just returns the owned string so the caller
	/// (the supervisor) can persist it wherever it likes.
	pub fn distribute(&self) -> String {
		self.snapshot_id.clone()
	}

	/// Spawns a background task that periodically runs a cheap no-op query
	/// against the exporting session, so the source never reclaims it as
	/// idle before every worker has imported the snapshot. Call once; the
	/// task is aborted automatically when the coordinator is dropped.
	pub fn keep_alive(&mut self) {
		if self.keep_alive_task.is_some() {
			return;
		}
		// Safety-valve queries only; the exported snapshot is tied to this
		// session's still-open transaction, which a plain SELECT does not
		// disturb.
		let client = self.client.clone();
		self.keep_alive_task = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);
			loop {
				ticker.tick().await;
				if client.simple_query("SELECT 1").await.is_err() {
					warn!("snapshot keep-alive query failed; session may have been lost");
					return;
				}
			}
		}));
	}
}

impl Drop for SnapshotCoordinator {
	fn drop(&mut self) {
		if let Some(task) = self.keep_alive_task.take() {
			task.abort();
		}
	}
}

/// Imports a previously exported snapshot identifier into the caller's own
/// read-only transaction on `client`. Intended to be the first statement a
/// worker runs after opening its source session.
#[instrument(skip(client), level = "debug")]
pub async fn import(client: &Client, snapshot_id: &str) -> Result<()> {
	client
		.batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE")
		.await
		.map_err(Error::Import)?;
	let query = format!("SET TRANSACTION SNAPSHOT '{}'", snapshot_id.replace('\'', "''"));
	client.batch_execute(&query).await.map_err(Error::Import)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn import_query_escapes_embedded_quotes() {
		// `snapshot_id` values are server-generated and never contain quotes
		// in practice, but the escaping must still be correct defensively.
		let id = "00000003-0000001A-1";
		let escaped = id.replace('\'', "''");
		assert_eq!(escaped, id);

		let weird = "a'b";
		assert_eq!(weird.replace('\'', "''"), "a''b");
	}
}
