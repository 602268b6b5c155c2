// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Journal Segments: one file per source WAL segment,
//! named from the decoded WAL file name, holding an append-only sequence
//! of records in LSN order. Writes go to a `.partial` sibling and are
//! renamed to their final name only once the closing SWITCH record has
//! been written, so readers never observe a torn segment.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use pgferry_core::Lsn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::{Message, RowChange};

/// One line of a Journal Segment. Lines are JSON objects, one per record,
/// so both the transformer and debugging tools can process a segment
/// without a custom binary parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
	pub lsn: Lsn,
	#[serde(flatten)]
	pub entry: JournalEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
	Keepalive,
	Begin { xid: u32 },
	Change { xid: u32, change: RowChange },
	Commit { xid: u32 },
	/// Written in place of a partial transaction's COMMIT when the
	/// receiver stops mid-transaction at `endpos` (stop
	/// condition 2), so the transformer/applier never see a dangling
	/// BEGIN.
	Rollback { xid: u32 },
	/// Marks the end of this segment; the next segment's first record's
	/// LSN equals this record's LSN (invariant).
	Switch,
}

impl JournalRecord {
	pub fn from_message(message: &Message) -> Self {
		let lsn = message.lsn();
		let entry = match message {
			Message::Begin { xid, .. } => JournalEntry::Begin { xid: *xid },
			Message::Change { xid, change, .. } => JournalEntry::Change { xid: *xid, change: change.clone() },
			Message::Commit { xid, .. } => JournalEntry::Commit { xid: *xid },
			Message::Keepalive { .. } => JournalEntry::Keepalive,
			Message::Switch { .. } => JournalEntry::Switch,
		};
		JournalRecord { lsn, entry }
	}

	pub fn rollback(xid: u32, lsn: Lsn) -> Self {
		JournalRecord { lsn, entry: JournalEntry::Rollback { xid } }
	}

	pub fn is_switch(&self) -> bool {
		matches!(self.entry, JournalEntry::Switch)
	}
}

/// Suffix used while a segment is still being written.
pub const PARTIAL_SUFFIX: &str = ".partial";
pub const JOURNAL_EXTENSION: &str = "json";

pub fn segment_path(dir: &Path, wal_file_name: &str) -> PathBuf {
	dir.join(format!("{wal_file_name}.{JOURNAL_EXTENSION}"))
}

fn partial_path(dir: &Path, wal_file_name: &str) -> PathBuf {
	dir.join(format!("{wal_file_name}.{JOURNAL_EXTENSION}{PARTIAL_SUFFIX}"))
}

/// Appends records to one segment's `.partial` file; `finalize` renames it
/// to its final name once the closing SWITCH has been written.
pub struct JournalWriter {
	dir: PathBuf,
	wal_file_name: String,
	file: File,
	last_lsn: Option<Lsn>,
}

impl JournalWriter {
	pub fn create(dir: &Path, wal_file_name: &str) -> Result<Self> {
		fs::create_dir_all(dir)?;
		let path = partial_path(dir, wal_file_name);
		let file = OpenOptions::new().create(true).append(true).open(&path)?;
		Ok(Self { dir: dir.to_path_buf(), wal_file_name: wal_file_name.to_string(), file, last_lsn: None })
	}

	/// Appends one record. Enforces the "records are in LSN order" invariant
	/// of (non-decreasing within a segment; keepalives may repeat
	/// an LSN, so strict inequality is not required).
	pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
		if let Some(last) = self.last_lsn {
			if record.lsn < last {
				return Err(Error::OutOfOrder { prev: last.to_string(), next: record.lsn.to_string() });
			}
		}
		let line = serde_json::to_string(record)?;
		writeln!(self.file, "{line}")?;
		self.last_lsn = Some(record.lsn);
		Ok(())
	}

	/// Appends the closing SWITCH record, fsyncs, and renames the
	/// `.partial` file to its final name. Returns the final path.
	pub fn finalize(mut self, switch_lsn: Lsn) -> Result<PathBuf> {
		self.append(&JournalRecord { lsn: switch_lsn, entry: JournalEntry::Switch })?;
		self.file.sync_all()?;
		let final_path = segment_path(&self.dir, &self.wal_file_name);
		fs::rename(partial_path(&self.dir, &self.wal_file_name), &final_path)?;
		Ok(final_path)
	}

	/// fsyncs the `.partial` file without finalizing it, so the receiver can
	/// advance `sentinel.flush_lsn` mid-segment (flow control)
	/// without rotating early.
	pub fn fsync(&self) -> Result<()> {
		self.file.sync_all()?;
		Ok(())
	}

	pub fn last_lsn(&self) -> Option<Lsn> {
		self.last_lsn
	}
}

/// Reads a finalized (non-`.partial`) segment's records, in file order.
pub fn read_segment(path: &Path) -> Result<Vec<JournalRecord>> {
	let file = File::open(path)?;
	let reader = BufReader::new(file);
	let mut out = Vec::new();
	for line in reader.lines() {
		let line = line?;
		if line.is_empty() {
			continue;
		}
		out.push(serde_json::from_str(&line)?);
	}
	Ok(out)
}

/// Lists finalized segment files in a directory, in WAL-file-name order
/// (which is LSN order, since the name is a fixed-width hex encoding of the
/// segment number). `.partial` siblings are skipped — the Transformer must
/// never read past the Receiver's write boundary.
pub fn list_finalized_segments(dir: &Path) -> Result<Vec<PathBuf>> {
	if !dir.exists() {
		return Ok(Vec::new());
	}
	let mut names = Vec::new();
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();
		let is_journal = path.extension().is_some_and(|ext| ext == JOURNAL_EXTENSION);
		if is_journal {
			names.push(path);
		}
	}
	names.sort();
	Ok(names)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::{ChangeKind, RowChange};

	fn sample_change(lsn: u64) -> Message {
		Message::Change {
			xid: 1,
			lsn: Lsn::new(lsn),
			change: RowChange {
				schema: "public".into(),
				table: "t".into(),
				kind: ChangeKind::Insert,
				columns: Vec::new(),
				old_columns: Vec::new(),
			},
		}
	}

	#[test]
	fn writer_rejects_out_of_order_records() {
		let dir = tempfile::tempdir().unwrap();
		let mut writer = JournalWriter::create(dir.path(), "000000010000000000000001").unwrap();
		writer.append(&JournalRecord::from_message(&Message::Begin { xid: 1, lsn: Lsn::new(100) })).unwrap();
		let err = writer.append(&JournalRecord::from_message(&Message::Begin { xid: 2, lsn: Lsn::new(50) })).unwrap_err();
		assert!(matches!(err, Error::OutOfOrder { .. }));
	}

	#[test]
	fn finalize_renames_partial_to_final_and_appends_switch() {
		let dir = tempfile::tempdir().unwrap();
		let segment_name = "000000010000000000000001";
		let mut writer = JournalWriter::create(dir.path(), segment_name).unwrap();
		writer.append(&JournalRecord::from_message(&sample_change(100))).unwrap();
		let final_path = writer.finalize(Lsn::new(200)).unwrap();

		assert_eq!(final_path, segment_path(dir.path(), segment_name));
		assert!(final_path.exists());
		assert!(!partial_path(dir.path(), segment_name).exists());

		let records = read_segment(&final_path).unwrap();
		assert_eq!(records.len(), 2);
		assert!(records.last().unwrap().is_switch());
		assert_eq!(records.last().unwrap().lsn, Lsn::new(200));
	}

	#[test]
	fn list_finalized_segments_skips_partial_files_and_sorts_by_name() {
		let dir = tempfile::tempdir().unwrap();
		let mut w1 = JournalWriter::create(dir.path(), "000000010000000000000002").unwrap();
		w1.append(&JournalRecord::from_message(&sample_change(10))).unwrap();
		w1.finalize(Lsn::new(20)).unwrap();

		let mut w2 = JournalWriter::create(dir.path(), "000000010000000000000001").unwrap();
		w2.append(&JournalRecord::from_message(&sample_change(1))).unwrap();
		// not finalized: stays a .partial sibling

		let segments = list_finalized_segments(dir.path()).unwrap();
		assert_eq!(segments.len(), 1);
		assert_eq!(segments[0], segment_path(dir.path(), "000000010000000000000002"));
	}

	#[test]
	fn adjacent_segments_meet_at_the_switch_lsn() {
		let dir = tempfile::tempdir().unwrap();
		let mut w1 = JournalWriter::create(dir.path(), "000000010000000000000001").unwrap();
		w1.append(&JournalRecord::from_message(&sample_change(5))).unwrap();
		let path1 = w1.finalize(Lsn::new(100)).unwrap();

		let mut w2 = JournalWriter::create(dir.path(), "000000010000000000000002").unwrap();
		w2.append(&JournalRecord::from_message(&sample_change(100))).unwrap();
		let path2 = w2.finalize(Lsn::new(200)).unwrap();

		let records1 = read_segment(&path1).unwrap();
		let records2 = read_segment(&path2).unwrap();
		assert_eq!(records1.last().unwrap().lsn, records2.first().unwrap().lsn);
	}
}
