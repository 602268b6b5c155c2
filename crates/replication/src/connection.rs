// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The low-level replication-protocol connection needs: slot
//! lookup/creation over a plain session, `START_REPLICATION` and standby
//! status updates over a dedicated replication-mode session.

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use pgferry_core::Lsn;
use postgres_protocol::message::backend::ReplicationMessage;
use postgres_protocol::message::frontend;
use tokio_postgres::config::ReplicationMode;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Microseconds between the Unix epoch and the Postgres epoch
/// (2000-01-01 00:00:00 UTC), the base every replication-protocol timestamp
/// is relative to.
const POSTGRES_EPOCH_OFFSET_MICROS: i64 = 946_684_800_000_000;

fn postgres_timestamp_now() -> i64 {
	let unix_micros = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap_or_default()
		.as_micros() as i64;
	unix_micros - POSTGRES_EPOCH_OFFSET_MICROS
}

/// Opens a plain (non-replication) session for slot bookkeeping queries.
pub async fn connect_plain(pguri: &str) -> Result<Client> {
	let (client, connection) = tokio_postgres::connect(pguri, NoTls).await.map_err(Error::Connect)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			warn!(%error, "replication control connection closed with an error");
		}
	});
	Ok(client)
}

/// Opens a replication-mode session, the only kind that accepts
/// `CREATE_REPLICATION_SLOT` / `START_REPLICATION`.
pub async fn connect_replication(pguri: &str) -> Result<Client> {
	let mut config: Config = pguri.parse().map_err(Error::Connect)?;
	config.replication_mode(ReplicationMode::Logical);
	let (client, connection) = config.connect(NoTls).await.map_err(Error::Connect)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			warn!(%error, "replication stream connection closed with an error");
		}
	});
	Ok(client)
}

pub struct SlotInfo {
	pub confirmed_flush_lsn: Lsn,
	pub snapshot_name: Option<String>,
}

/// Looks up an existing slot's confirmed-flush LSN via the plain control
/// session.
pub async fn lookup_slot(control: &Client, slot_name: &str) -> Result<Option<Lsn>> {
	let rows = control
		.query("SELECT confirmed_flush_lsn::text FROM pg_replication_slots WHERE slot_name = $1", &[&slot_name])
		.await
		.map_err(Error::Protocol)?;
	match rows.first() {
		Some(row) => {
			let text: String = row.get(0);
			let lsn = text.parse().map_err(pgferry_core::Error::from).map_err(|e| Error::Stream(e.to_string()))?;
			Ok(Some(lsn))
		}
		None => Ok(None),
	}
}

/// Creates a new logical replication slot over the replication-mode
/// session, optionally exporting a snapshot the copy engine can import
///.
pub async fn create_slot(replication: &Client, slot_name: &str, output_plugin: &str, export_snapshot: bool) -> Result<SlotInfo> {
	let snapshot_clause = if export_snapshot { "EXPORT_SNAPSHOT" } else { "NOEXPORT_SNAPSHOT" };
	let query = format!("CREATE_REPLICATION_SLOT {slot_name} LOGICAL {output_plugin} {snapshot_clause}");
	let rows = replication.simple_query(&query).await.map_err(Error::Protocol)?;

	let mut consistent_point = None;
	let mut snapshot_name = None;
	for message in rows {
		if let SimpleQueryMessage::Row(row) = message {
			consistent_point = row.get("consistent_point").map(|s| s.to_string());
			snapshot_name = row.get("snapshot_name").map(|s| s.to_string());
		}
	}
	let consistent_point = consistent_point.ok_or_else(|| Error::Stream("CREATE_REPLICATION_SLOT returned no row".into()))?;
	let confirmed_flush_lsn =
		consistent_point.parse().map_err(pgferry_core::Error::from).map_err(|e| Error::Stream(e.to_string()))?;
	Ok(SlotInfo { confirmed_flush_lsn, snapshot_name })
}

/// Begins streaming from `start_lsn` on an already-open replication-mode
/// session.
pub async fn start_replication(
	replication: &Client,
	slot_name: &str,
	output_plugin: &str,
	start_lsn: Lsn,
) -> Result<ReplicationStream> {
	let query = format!(
		"START_REPLICATION SLOT {slot_name} LOGICAL {start_lsn} (\"include-xids\" 'true', \"include-timestamp\" 'true')",
	);
	// wal2json expects its options this way; test_decoding ignores unknown
	// options, so the same query shape works for both plugins.
	let _ = output_plugin;
	let duplex = replication.copy_both_simple::<Bytes>(&query).await.map_err(Error::Protocol)?;
	Ok(ReplicationStream::new(duplex))
}

/// Drops a logical slot by name over a plain control session, once the run
/// no longer needs it to pin WAL retention (the cleanup step).
/// A missing slot is not an error: cleanup is idempotent across retries.
pub async fn drop_slot_if_exists(control: &Client, slot_name: &str) -> Result<()> {
	let exists = lookup_slot(control, slot_name).await?.is_some();
	if exists {
		control.execute("SELECT pg_drop_replication_slot($1)", &[&slot_name]).await.map_err(Error::Protocol)?;
	}
	Ok(())
}

/// One decoded frame off the replication stream: either a row of raw
/// decoder-plugin output tagged with its LSN, or a keepalive the caller
/// must acknowledge.
pub enum StreamFrame {
	Data { lsn: Lsn, payload: Bytes },
	Keepalive { lsn: Lsn, reply_requested: bool },
}

/// Wraps the raw `CopyBothDuplex<Bytes>` stream, decoding the outer
/// replication-protocol envelope (`XLogData` / `PrimaryKeepAlive`) and
/// exposing a `send_status_update` for flow control.
pub struct ReplicationStream {
	duplex: std::pin::Pin<Box<tokio_postgres::CopyBothDuplex<Bytes>>>,
}

impl ReplicationStream {
	fn new(duplex: tokio_postgres::CopyBothDuplex<Bytes>) -> Self {
		Self { duplex: Box::pin(duplex) }
	}

	pub async fn next_frame(&mut self) -> Result<Option<StreamFrame>> {
		let Some(chunk) = self.duplex.next().await else {
			return Ok(None);
		};
		let chunk = chunk.map_err(Error::Protocol)?;
		let message = ReplicationMessage::parse(&chunk).map_err(|e| Error::Stream(e.to_string()))?;
		match message {
			ReplicationMessage::XLogData(body) => {
				Ok(Some(StreamFrame::Data { lsn: Lsn::new(body.wal_start()), payload: body.into_data() }))
			}
			ReplicationMessage::PrimaryKeepAlive(body) => {
				Ok(Some(StreamFrame::Keepalive { lsn: Lsn::new(body.wal_end()), reply_requested: body.reply() != 0 }))
			}
			other => Err(Error::Stream(format!("unexpected replication message variant: {other:?}"))),
		}
	}

	/// Sends the standby status update triple: written, flushed, and
	/// applied LSNs. `applied` is read asynchronously from the sentinel by
	/// the caller, since it's written by a different component (the
	/// Applier).
	pub async fn send_status_update(&mut self, written: Lsn, flushed: Lsn, applied: Lsn) -> Result<()> {
		let mut buf = BytesMut::new();
		frontend::standby_status_update(
			written.as_u64() as i64,
			flushed.as_u64() as i64,
			applied.as_u64() as i64,
			postgres_timestamp_now(),
			0,
			&mut buf,
		)
		.map_err(|e| Error::Stream(e.to_string()))?;
		debug!(%written, %flushed, %applied, "sending standby status update");
		self.duplex.send(buf.freeze()).await.map_err(Error::Protocol)
	}
}
