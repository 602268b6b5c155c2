// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The CDC Receiver: drives the replication-protocol connection, writes
//! Journal Segments, and advances the sentinel's write/flush LSNs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgferry_catalog::CatalogStore;
use pgferry_cdc::{self, JournalRecord, JournalWriter};
use pgferry_core::{CancellationToken, Lsn};
use tracing::{info, instrument, warn};

use crate::connection::{self, StreamFrame};
use crate::error::{Error, Result};

/// How often the receiver sends a standby status update even absent a
/// server-requested keepalive reply (flow control).
const STATUS_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
	pub source_pguri: Arc<str>,
	pub slot_name: String,
	pub output_plugin: String,
	pub journal_dir: PathBuf,
	pub timeline: u32,
	pub wal_segment_size: u64,
	pub create_slot_if_missing: bool,
	pub export_snapshot: bool,
}

/// Tracks the currently-open Journal Segment and rotates it whenever a
/// record's LSN falls in a different WAL file than the one currently open
/// (records are appended to the Journal Segment whose name is derived
/// from the source WAL-file name that contains the record's LSN).
struct JournalCursor {
	dir: PathBuf,
	timeline: u32,
	wal_segment_size: u64,
	current_segment: Option<String>,
	writer: Option<JournalWriter>,
}

impl JournalCursor {
	fn new(dir: PathBuf, timeline: u32, wal_segment_size: u64) -> Self {
		Self { dir, timeline, wal_segment_size, current_segment: None, writer: None }
	}

	fn segment_for(&self, lsn: Lsn) -> String {
		lsn.wal_file_name(self.timeline, self.wal_segment_size)
	}

	/// Appends `record`, rotating to a new segment first if `record.lsn`
	/// belongs to a WAL file different from the currently-open one.
	fn append(&mut self, record: JournalRecord) -> Result<()> {
		let segment_name = self.segment_for(record.lsn);
		if self.current_segment.as_deref() != Some(segment_name.as_str()) {
			if let Some(writer) = self.writer.take() {
				writer.finalize(record.lsn)?;
			}
			self.writer = Some(JournalWriter::create(&self.dir, &segment_name)?);
			self.current_segment = Some(segment_name);
		}
		self.writer.as_mut().expect("writer just opened above").append(&record)?;
		Ok(())
	}

	fn fsync(&self) -> Result<()> {
		if let Some(writer) = &self.writer {
			writer.fsync()?;
		}
		Ok(())
	}

	fn last_lsn(&self) -> Option<Lsn> {
		self.writer.as_ref().and_then(JournalWriter::last_lsn)
	}

	fn close_at(mut self, lsn: Lsn) -> Result<()> {
		if let Some(writer) = self.writer.take() {
			writer.finalize(lsn)?;
		}
		Ok(())
	}
}

/// Runs the receiver to completion: connects, resolves a start LSN,
/// streams records into Journal Segments, and stops on any of the three
/// stop conditions (idle keepalive past endpos, a commit past endpos, or
/// cancellation).
#[instrument(skip_all)]
pub async fn run_receiver(config: ReceiverConfig, catalog: Arc<CatalogStore>, token: CancellationToken) -> Result<()> {
	let control = connection::connect_plain(&config.source_pguri).await?;
	let replication = connection::connect_replication(&config.source_pguri).await?;

	let slot_confirmed_flush = match connection::lookup_slot(&control, &config.slot_name).await? {
		Some(lsn) => lsn,
		None => {
			if !config.create_slot_if_missing {
				return Err(Error::MissingSlot(config.slot_name.clone()));
			}
			let info = connection::create_slot(
				&replication,
				&config.slot_name,
				&config.output_plugin,
				config.export_snapshot,
			)
			.await?;
			if let Some(snapshot_id) = info.snapshot_name {
				catalog.set_shared_snapshot(&snapshot_id)?;
			}
			info.confirmed_flush_lsn
		}
	};

	let sentinel = catalog.read_sentinel()?;
	let start_lsn = std::cmp::max(sentinel.startpos, slot_confirmed_flush);

	let mut stream = connection::start_replication(&replication, &config.slot_name, &config.output_plugin, start_lsn).await?;
	let decoder = pgferry_cdc::decoder_for(&config.output_plugin)?;
	let mut journal = JournalCursor::new(config.journal_dir.clone(), config.timeline, config.wal_segment_size);
	let mut last_status_update = tokio::time::Instant::now();

	loop {
		if token.is_cancelled() {
			info!("receiver cancelled; closing current segment");
			break;
		}

		let frame = tokio::select! {
			frame = stream.next_frame() => frame?,
			_ = token.cancelled() => { info!("receiver cancelled mid-wait"); break; }
			_ = tokio::time::sleep(STATUS_UPDATE_INTERVAL) => {
				send_periodic_status(&mut stream, &journal, &catalog).await?;
				last_status_update = tokio::time::Instant::now();
				continue;
			}
		};

		let Some(frame) = frame else {
			info!("replication stream ended");
			break;
		};

		match frame {
			StreamFrame::Data { lsn, payload } => {
				let message = decoder.decode(&payload, lsn)?;
				if let pgferry_cdc::Message::Commit { xid, lsn: commit_lsn } = &message {
					let sentinel = catalog.read_sentinel()?;
					if sentinel.reached_endpos(*commit_lsn) {
						// Stop condition 2: discard the partial transaction by
						// writing a ROLLBACK marker instead of the COMMIT.
						journal.append(JournalRecord::rollback(*xid, *commit_lsn))?;
						journal.fsync()?;
						catalog.set_write_flush(*commit_lsn, *commit_lsn)?;
						info!(%commit_lsn, "endpos reached mid-transaction; wrote rollback marker");
						break;
					}
				}
				journal.append(JournalRecord::from_message(&message))?;
			}
			StreamFrame::Keepalive { lsn, reply_requested } => {
				journal.append(JournalRecord { lsn, entry: pgferry_cdc::JournalEntry::Keepalive })?;
				let sentinel = catalog.read_sentinel()?;
				let stop = sentinel.reached_endpos(lsn);
				if reply_requested || stop {
					journal.fsync()?;
					catalog.set_write_flush(lsn, lsn)?;
					let applied = catalog.read_sentinel()?.replay_lsn;
					stream.send_status_update(lsn, lsn, applied).await?;
					last_status_update = tokio::time::Instant::now();
				}
				if stop {
					info!(%lsn, "endpos reached at an idle keepalive; stopping");
					break;
				}
			}
		}

		if last_status_update.elapsed() >= STATUS_UPDATE_INTERVAL {
			send_periodic_status(&mut stream, &journal, &catalog).await?;
			last_status_update = tokio::time::Instant::now();
		}
	}

	let close_lsn = journal.last_lsn().unwrap_or(start_lsn);
	journal.close_at(close_lsn)?;
	catalog.set_write_flush(close_lsn, close_lsn)?;
	Ok(())
}

async fn send_periodic_status(
	stream: &mut connection::ReplicationStream,
	journal: &JournalCursor,
	catalog: &CatalogStore,
) -> Result<()> {
	if let Some(lsn) = journal.last_lsn() {
		journal.fsync()?;
		catalog.set_write_flush(lsn, lsn)?;
		let applied = catalog.read_sentinel()?.replay_lsn;
		stream.send_status_update(lsn, lsn, applied).await?;
	}
	Ok(())
}

/// Path the transformer/applier will read Journal Segments from for a
/// given run's journal directory.
pub fn journal_dir(base: &Path) -> PathBuf {
	base.join("journal")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rotates_segments_exactly_at_a_wal_boundary() {
		let dir = tempfile::tempdir().unwrap();
		let mut cursor = JournalCursor::new(dir.path().to_path_buf(), 1, pgferry_core::lsn::DEFAULT_WAL_SEGMENT_SIZE);

		let seg_size = pgferry_core::lsn::DEFAULT_WAL_SEGMENT_SIZE;
		cursor.append(JournalRecord { lsn: Lsn::new(10), entry: pgferry_cdc::JournalEntry::Keepalive }).unwrap();
		assert_eq!(cursor.current_segment.as_deref(), Some(Lsn::new(10).wal_file_name(1, seg_size).as_str()));

		// Crossing into the next segment rotates.
		cursor.append(JournalRecord { lsn: Lsn::new(seg_size + 10), entry: pgferry_cdc::JournalEntry::Keepalive }).unwrap();
		assert_eq!(
			cursor.current_segment.as_deref(),
			Some(Lsn::new(seg_size + 10).wal_file_name(1, seg_size).as_str())
		);

		let finalized = pgferry_cdc::list_finalized_segments(dir.path()).unwrap();
		assert_eq!(finalized.len(), 1, "only the first (rotated-away) segment should be finalized so far");
	}

	#[test]
	fn closing_finalizes_the_still_open_segment() {
		let dir = tempfile::tempdir().unwrap();
		let mut cursor = JournalCursor::new(dir.path().to_path_buf(), 1, pgferry_core::lsn::DEFAULT_WAL_SEGMENT_SIZE);
		cursor.append(JournalRecord { lsn: Lsn::new(1), entry: pgferry_cdc::JournalEntry::Keepalive }).unwrap();
		cursor.close_at(Lsn::new(2)).unwrap();

		let finalized = pgferry_cdc::list_finalized_segments(dir.path()).unwrap();
		assert_eq!(finalized.len(), 1);
	}
}
