// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Thin wrappers over Postgres's replication-origin functions: the
//! mechanism that makes the Applier's replay exactly-once by tying the
//! origin's replay position to the same transaction as the data it
//! replays.

use pgferry_core::Lsn;
use tokio_postgres::Client;

use crate::error::{Error, Result};

/// Creates the named origin if it doesn't already exist. Idempotent across
/// restarts, so re-running after a crash never fails on an already-created
/// origin.
pub async fn create_if_missing(client: &Client, name: &str) -> Result<()> {
	let exists = client
		.query_opt("SELECT 1 FROM pg_replication_origin WHERE roname = $1", &[&name])
		.await
		.map_err(Error::Target)?
		.is_some();
	if !exists {
		client.execute("SELECT pg_replication_origin_create($1)", &[&name]).await.map_err(Error::Target)?;
	}
	Ok(())
}

/// Associates the current session with `name`, required before
/// `xact_setup` can be called inside a transaction on this session.
pub async fn session_setup(client: &Client, name: &str) -> Result<()> {
	client.execute("SELECT pg_replication_origin_session_setup($1)", &[&name]).await.map_err(Error::Target)?;
	Ok(())
}

pub async fn session_reset(client: &Client) -> Result<()> {
	client.execute("SELECT pg_replication_origin_session_reset()", &[]).await.map_err(Error::Target)?;
	Ok(())
}

/// Records `lsn` as the origin LSN for the transaction currently open on
/// this session; Postgres persists it atomically with that transaction's
/// commit, which is what makes replay exactly-once across crashes.
pub async fn xact_setup(client: &Client, lsn: Lsn) -> Result<()> {
	let lsn_text = lsn.to_string();
	client
		.execute("SELECT pg_replication_origin_xact_setup($1::pg_lsn, now())", &[&lsn_text])
		.await
		.map_err(Error::Target)?;
	Ok(())
}

/// Drops the named origin. Called once the applier has caught up to
/// `endpos` and the run is being torn down (the cleanup step).
pub async fn drop_if_exists(client: &Client, name: &str) -> Result<()> {
	let exists =
		client.query_opt("SELECT 1 FROM pg_replication_origin WHERE roname = $1", &[&name]).await.map_err(Error::Target)?.is_some();
	if exists {
		client.execute("SELECT pg_replication_origin_drop($1)", &[&name]).await.map_err(Error::Target)?;
	}
	Ok(())
}

/// The origin's last durably-committed replay LSN, queryable without any
/// session association — this is what the skip rule compares against.
pub async fn current_progress(client: &Client, name: &str) -> Result<Lsn> {
	let row = client
		.query_one("SELECT pg_replication_origin_progress($1, true)::text", &[&name])
		.await
		.map_err(Error::Target)?;
	let text: String = row.get(0);
	text.parse().map_err(pgferry_core::Error::from).map_err(|e| Error::Stream(e.to_string()))
}
