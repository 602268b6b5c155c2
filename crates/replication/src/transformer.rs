// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The CDC Transformer: consumes Journal Segments in LSN
//! order and emits line-oriented Statement Files, one per segment, using
//! the Catalog Store's content-addressed statement cache to emit each
//! `PREPARE` only the first time its shape is seen in the run.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use pgferry_catalog::CatalogStore;
use pgferry_cdc::{ControlMarker, JournalEntry, JournalRecord, StatementLine};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TransformerConfig {
	pub journal_dir: PathBuf,
	pub statement_dir: PathBuf,
}

/// The statement file a journal segment transforms into: same base name,
/// `.sql` extension, one-to-one with the segment.
pub fn statement_file_path(statement_dir: &Path, journal_segment_path: &Path) -> PathBuf {
	let stem = journal_segment_path.file_stem().unwrap_or_default();
	statement_dir.join(format!("{}.sql", stem.to_string_lossy()))
}

fn progress_key(segment_path: &Path) -> String {
	format!("transformer_progress:{}", segment_path.file_name().unwrap_or_default().to_string_lossy())
}

/// Renders one journal record to the line(s) of its statement-file
/// representation. `intern` persists a newly-seen statement shape and
/// reports whether this is the first time it's been seen in the run, so the
/// caller knows whether to emit the `PREPARE` line.
fn render_record(record: &JournalRecord, intern: &mut dyn FnMut(&str, &str) -> Result<bool>) -> Result<Vec<String>> {
	match &record.entry {
		JournalEntry::Keepalive => Ok(vec![ControlMarker::Keepalive { lsn: record.lsn }.render()]),
		JournalEntry::Begin { xid } => Ok(vec![ControlMarker::Begin { xid: *xid, lsn: record.lsn }.render()]),
		JournalEntry::Commit { xid } => Ok(vec![ControlMarker::Commit { xid: *xid, lsn: record.lsn }.render()]),
		JournalEntry::Rollback { xid } => Ok(vec![ControlMarker::Rollback { xid: *xid, lsn: record.lsn }.render()]),
		JournalEntry::Switch => Ok(vec![ControlMarker::Switch { lsn: record.lsn }.render()]),
		JournalEntry::Change { change, .. } => {
			let StatementLine::Statement { prepare, hash, execute_values } = pgferry_cdc::render_change(change) else {
				unreachable!("render_change always renders a row change as a Statement line")
			};
			let is_new = intern(&hash, &prepare)?;
			let mut lines = Vec::with_capacity(2);
			if is_new {
				lines.push(prepare);
			}
			lines.push(format!("EXECUTE {hash}({});", execute_values.join(", ")));
			Ok(lines)
		}
	}
}

/// Trims a torn trailing line left by a crash mid-write, so resumed output
/// never appends after a partial statement.
fn truncate_trailing_partial_line(path: &Path) -> Result<()> {
	if !path.exists() {
		return Ok(());
	}
	let content = fs::read(path)?;
	if content.is_empty() || content.ends_with(b"\n") {
		return Ok(());
	}
	let cut = content.iter().rposition(|&b| b == b'\n').map(|i| i + 1).unwrap_or(0);
	let file = OpenOptions::new().write(true).open(path)?;
	file.set_len(cut as u64)?;
	Ok(())
}

/// Transforms one finalized journal segment into its statement file,
/// resuming from the last record a prior (possibly crashed) run durably
/// recorded as written.
#[instrument(skip(catalog), fields(segment = %segment_path.display()))]
pub fn transform_segment(catalog: &CatalogStore, segment_path: &Path, out_path: &Path) -> Result<()> {
	let key = progress_key(segment_path);
	let already_done: usize = catalog.get_run_state(&key)?.and_then(|s| s.parse().ok()).unwrap_or(0);

	truncate_trailing_partial_line(out_path)?;
	let mut file = OpenOptions::new().create(true).append(true).open(out_path)?;

	let records = pgferry_cdc::read_segment(segment_path)?;
	for (index, record) in records.iter().enumerate() {
		if index < already_done {
			continue;
		}
		let mut intern = |hash: &str, sql: &str| catalog.intern_statement(hash, sql).map_err(Error::from);
		let lines = render_record(record, &mut intern)?;
		for line in &lines {
			writeln!(file, "{line}")?;
		}
		file.sync_all()?;
		catalog.set_run_state(&key, &(index + 1).to_string())?;
	}
	debug!(records = records.len(), "segment transformed");
	Ok(())
}

/// Transforms every finalized journal segment that doesn't yet have a
/// complete statement file. Safe to call repeatedly (e.g. from a polling
/// loop while the Receiver is still writing new segments).
pub fn run_transformer(catalog: &CatalogStore, config: &TransformerConfig) -> Result<()> {
	fs::create_dir_all(&config.statement_dir)?;
	for segment_path in pgferry_cdc::list_finalized_segments(&config.journal_dir)? {
		let out_path = statement_file_path(&config.statement_dir, &segment_path);
		transform_segment(catalog, &segment_path, &out_path)?;
	}
	Ok(())
}

/// Ensures the output directory exists up front, mirroring the layout
/// `run_transformer` expects (used by the supervisor before spawning the
/// transformer's polling task).
pub fn ensure_statement_dir(statement_dir: &Path) -> Result<()> {
	fs::create_dir_all(statement_dir)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pgferry_cdc::ChangeKind;
	use pgferry_core::Lsn;

	fn change_record(lsn: u64, xid: u32) -> JournalRecord {
		JournalRecord {
			lsn: Lsn::new(lsn),
			entry: JournalEntry::Change {
				xid,
				change: pgferry_cdc::RowChange {
					schema: "public".into(),
					table: "t".into(),
					kind: ChangeKind::Insert,
					columns: vec![pgferry_cdc::ColumnValue {
						name: "id".into(),
						type_name: "int4".into(),
						data: pgferry_cdc::ColumnData::Text("1".into()),
					}],
					old_columns: Vec::new(),
				},
			},
		}
	}

	#[test]
	fn control_records_render_as_a_single_comment_line() {
		let record = JournalRecord { lsn: Lsn::new(1), entry: JournalEntry::Begin { xid: 7 } };
		let mut intern = |_: &str, _: &str| Ok(true);
		let lines = render_record(&record, &mut intern).unwrap();
		assert_eq!(lines, vec![format!("-- BEGIN 7@{}", Lsn::new(1))]);
	}

	#[test]
	fn change_records_emit_prepare_only_the_first_time() {
		let record = change_record(10, 1);
		let mut seen = false;
		let mut intern = |_: &str, _: &str| {
			let is_new = !seen;
			seen = true;
			Ok(is_new)
		};
		let first = render_record(&record, &mut intern).unwrap();
		assert_eq!(first.len(), 2);
		assert!(first[0].starts_with("PREPARE"));
		assert!(first[1].starts_with("EXECUTE"));

		let second = render_record(&record, &mut intern).unwrap();
		assert_eq!(second.len(), 1);
		assert!(second[0].starts_with("EXECUTE"));
	}

	#[test]
	fn truncate_trailing_partial_line_drops_only_the_torn_suffix() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.sql");
		fs::write(&path, b"-- BEGIN 1@0/0\nEXECUTE abc(").unwrap();
		truncate_trailing_partial_line(&path).unwrap();
		let content = fs::read_to_string(&path).unwrap();
		assert_eq!(content, "-- BEGIN 1@0/0\n");
	}

	#[test]
	fn truncate_trailing_partial_line_is_a_no_op_on_clean_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.sql");
		fs::write(&path, b"-- BEGIN 1@0/0\n").unwrap();
		truncate_trailing_partial_line(&path).unwrap();
		assert_eq!(fs::read_to_string(&path).unwrap(), "-- BEGIN 1@0/0\n");
	}

	#[test]
	fn transform_segment_resumes_from_the_recorded_progress() {
		let catalog = CatalogStore::open_in_memory().unwrap();
		let dir = tempfile::tempdir().unwrap();
		let segment_path = dir.path().join("seg.json");

		let records = vec![
			JournalRecord { lsn: Lsn::new(1), entry: JournalEntry::Begin { xid: 1 } },
			change_record(2, 1),
			JournalRecord { lsn: Lsn::new(3), entry: JournalEntry::Commit { xid: 1 } },
		];
		{
			let mut file = File::create(&segment_path).unwrap();
			for record in &records {
				writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
			}
		}

		let out_path = dir.path().join("seg.sql");
		transform_segment(&catalog, &segment_path, &out_path).unwrap();
		let first_pass = fs::read_to_string(&out_path).unwrap();
		assert!(first_pass.contains("BEGIN 1@"));
		assert!(first_pass.contains("PREPARE"));
		assert!(first_pass.contains("COMMIT 1@"));

		// Running again must not duplicate any line (idempotent).
		transform_segment(&catalog, &segment_path, &out_path).unwrap();
		let second_pass = fs::read_to_string(&out_path).unwrap();
		assert_eq!(first_pass, second_pass);
	}
}
