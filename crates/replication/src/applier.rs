// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The CDC Applier: replays Statement Files against the
//! target inside one transaction per source transaction, advancing a
//! Postgres replication origin atomically with each commit so replay is
//! exactly-once across crashes. Gated by `sentinel.apply`; stops at
//! `sentinel.endpos` the same way the Receiver does.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgferry_catalog::CatalogStore;
use pgferry_cdc::{ControlMarker, ParsedLine};
use pgferry_core::{CancellationToken, Lsn};
use tokio_postgres::Client;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::origin;

const CURRENT_FILE_KEY: &str = "applier_current_file";

#[derive(Debug, Clone)]
pub struct ApplierConfig {
	pub target_pguri: Arc<str>,
	pub statement_dir: PathBuf,
	pub origin_name: String,
	pub poll_interval: Duration,
}

/// The extension the Transformer writes statement files with.
const STATEMENT_EXTENSION: &str = "sql";

/// Lists statement files in name order (which is WAL order, same as
/// [`pgferry_cdc::list_finalized_segments`]'s journal segments — statement
/// files share their stem with the segment they were derived from).
fn list_statement_files(dir: &Path) -> Result<Vec<PathBuf>> {
	if !dir.exists() {
		return Ok(Vec::new());
	}
	let mut names = Vec::new();
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();
		if path.extension().is_some_and(|ext| ext == STATEMENT_EXTENSION) {
			names.push(path);
		}
	}
	names.sort();
	Ok(names)
}

/// Outcome of working through one statement file's currently-available
/// lines.
enum FileOutcome {
	/// Reached the file's closing SWITCH marker: fully consumed.
	Finished,
	/// Ran out of lines before a SWITCH marker; the Transformer may still
	/// be appending. Caller should poll again rather than advance.
	AwaitingMore,
	/// A BEGIN at or past `sentinel.endpos` was seen; stop the applier
	/// entirely (endpos rule).
	ReachedEndpos,
}

/// Runs the applier until cancelled or until `sentinel.endpos` is reached.
#[instrument(skip_all)]
pub async fn run_applier(config: ApplierConfig, catalog: Arc<CatalogStore>, token: CancellationToken) -> Result<()> {
	let target = connect(&config.target_pguri).await?;
	origin::create_if_missing(&target, &config.origin_name).await?;
	origin::session_setup(&target, &config.origin_name).await?;

	let mut prepared_this_session: HashSet<String> = HashSet::new();

	loop {
		if token.is_cancelled() {
			info!("applier cancelled");
			break;
		}

		let sentinel = catalog.read_sentinel()?;
		if !sentinel.apply {
			debug!("apply gate closed; waiting");
			if sleep_or_cancelled(config.poll_interval, &token).await {
				break;
			}
			continue;
		}

		let files = list_statement_files(&config.statement_dir)?;
		let current_name = catalog.get_run_state(CURRENT_FILE_KEY)?;
		let remaining: Vec<&PathBuf> = match &current_name {
			Some(name) => files.iter().filter(|p| file_name_ge(p, name)).collect(),
			None => files.iter().collect(),
		};

		if remaining.is_empty() {
			if sleep_or_cancelled(config.poll_interval, &token).await {
				break;
			}
			continue;
		}

		let mut made_progress = false;
		let mut reached_endpos = false;
		for path in remaining {
			if token.is_cancelled() {
				break;
			}
			match apply_file(&target, &catalog, path, &config.origin_name, &mut prepared_this_session).await? {
				FileOutcome::Finished => {
					let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
					catalog.set_run_state(CURRENT_FILE_KEY, &name)?;
					made_progress = true;
				}
				FileOutcome::AwaitingMore => break,
				FileOutcome::ReachedEndpos => {
					reached_endpos = true;
					break;
				}
			}
		}

		if reached_endpos {
			info!("endpos reached; applier stopping");
			break;
		}
		if !made_progress && sleep_or_cancelled(config.poll_interval, &token).await {
			break;
		}
	}

	origin::session_reset(&target).await?;
	Ok(())
}

/// Whether `path`'s file name sorts at or after `name` — used to resume
/// from the file the applier was last working through (inclusive, since
/// that file may not have been fully consumed yet).
fn file_name_ge(path: &Path, name: &str) -> bool {
	path.file_name().map(|n| n.to_string_lossy().into_owned()).is_some_and(|n| n.as_str() >= name)
}

async fn connect(pguri: &str) -> Result<Client> {
	let (client, connection) = tokio_postgres::connect(pguri, tokio_postgres::NoTls).await.map_err(Error::Target)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(%error, "applier target session connection task ended with an error");
		}
	});
	Ok(client)
}

async fn sleep_or_cancelled(duration: Duration, token: &CancellationToken) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(duration) => false,
		_ = token.cancelled() => true,
	}
}

/// Works through as many complete transactions as are currently available
/// in `path`, applying each against `target` unless the skip or endpos
/// rules say otherwise.
#[instrument(skip(target, catalog, prepared_this_session), fields(file = %path.display()))]
async fn apply_file(
	target: &Client,
	catalog: &CatalogStore,
	path: &Path,
	origin_name: &str,
	prepared_this_session: &mut HashSet<String>,
) -> Result<FileOutcome> {
	let content = fs::read_to_string(path)?;
	let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();

	let mut pos = 0usize;
	while pos < lines.len() {
		let parsed = pgferry_cdc::parse_line(lines[pos])?;
		match parsed {
			ParsedLine::Control(ControlMarker::Switch { .. }) => {
				return Ok(FileOutcome::Finished);
			}
			ParsedLine::Control(ControlMarker::Keepalive { .. }) => {
				pos += 1;
			}
			ParsedLine::Control(ControlMarker::Begin { xid, .. }) => {
				let Some(end) = find_transaction_end(&lines, pos) else {
					return Ok(FileOutcome::AwaitingMore);
				};
				let commit_lsn = match pgferry_cdc::parse_line(lines[end])? {
					ParsedLine::Control(ControlMarker::Commit { lsn, .. } | ControlMarker::Rollback { lsn, .. }) => lsn,
					other => return Err(Error::Stream(format!("transaction end is not a COMMIT/ROLLBACK marker: {other:?}"))),
				};

				let sentinel = catalog.read_sentinel()?;
				if sentinel.endpos.is_some_and(|endpos| commit_lsn >= endpos && commit_lsn != endpos) {
					return Ok(FileOutcome::ReachedEndpos);
				}

				let origin_progress = origin::current_progress(target, origin_name).await?;
				if commit_lsn <= origin_progress {
					debug!(%xid, %commit_lsn, "skipping already-applied transaction");
					pos = end + 1;
					continue;
				}

				apply_transaction(target, catalog, &lines[pos..=end], commit_lsn, prepared_this_session).await?;
				pos = end + 1;
			}
			ParsedLine::Control(other) => {
				return Err(Error::Stream(format!("unexpected control marker outside a transaction: {other:?}")));
			}
			ParsedLine::Prepare { .. } | ParsedLine::Execute { .. } => {
				return Err(Error::Stream(format!("statement line outside a BEGIN/COMMIT pair: {:?}", lines[pos])));
			}
		}
	}
	Ok(FileOutcome::AwaitingMore)
}

/// Finds the index of the COMMIT/ROLLBACK line closing the transaction
/// that starts at `begin_pos`, or `None` if the lines available so far
/// don't yet include it (the Transformer hasn't caught up).
fn find_transaction_end(lines: &[&str], begin_pos: usize) -> Option<usize> {
	for (offset, line) in lines.iter().enumerate().skip(begin_pos + 1) {
		if let Ok(ParsedLine::Control(ControlMarker::Commit { .. } | ControlMarker::Rollback { .. })) =
			pgferry_cdc::parse_line(line)
		{
			return Some(offset);
		}
	}
	None
}

/// Replays one BEGIN..COMMIT/ROLLBACK slice inside a single target
/// transaction, advancing the origin atomically with a COMMIT. A
/// ROLLBACK-terminated slice (the endpos-reached-mid-transaction
/// marker) is discarded outright without touching the target at all, since
/// nothing in it is meant to survive.
async fn apply_transaction(
	target: &Client,
	catalog: &CatalogStore,
	lines: &[&str],
	commit_lsn: Lsn,
	prepared_this_session: &mut HashSet<String>,
) -> Result<()> {
	let is_rollback =
		matches!(pgferry_cdc::parse_line(lines.last().expect("non-empty slice"))?, ParsedLine::Control(ControlMarker::Rollback { .. }));
	if is_rollback {
		return Ok(());
	}

	target.batch_execute("BEGIN").await.map_err(Error::Target)?;
	origin::xact_setup(target, commit_lsn).await?;

	for line in &lines[1..lines.len() - 1] {
		match pgferry_cdc::parse_line(line)? {
			ParsedLine::Prepare { hash, raw } => {
				target.batch_execute(&raw).await.map_err(Error::Target)?;
				prepared_this_session.insert(hash);
			}
			ParsedLine::Execute { hash, raw } => {
				if !prepared_this_session.contains(&hash) {
					let sql = catalog
						.lookup_statement(&hash)?
						.ok_or_else(|| Error::Stream(format!("unknown statement hash {hash:?}")))?;
					target.batch_execute(&format!("PREPARE {hash} AS {sql};")).await.map_err(Error::Target)?;
					prepared_this_session.insert(hash);
				}
				target.batch_execute(&raw).await.map_err(Error::Target)?;
			}
			ParsedLine::Control(_) => {
				return Err(Error::Stream("unexpected control marker inside a transaction body".to_string()));
			}
		}
	}

	target.batch_execute("COMMIT").await.map_err(Error::Target)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn list_statement_files_sorts_by_name_and_ignores_other_extensions() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("000000010000000000000002.sql"), "").unwrap();
		fs::write(dir.path().join("000000010000000000000001.sql"), "").unwrap();
		fs::write(dir.path().join("000000010000000000000001.json"), "").unwrap();

		let files = list_statement_files(dir.path()).unwrap();
		assert_eq!(files.len(), 2);
		assert!(files[0].to_string_lossy().ends_with("000000010000000000000001.sql"));
		assert!(files[1].to_string_lossy().ends_with("000000010000000000000002.sql"));
	}

	#[test]
	fn list_statement_files_on_missing_dir_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("does-not-exist");
		assert!(list_statement_files(&missing).unwrap().is_empty());
	}

	#[test]
	fn file_name_ge_compares_by_name_not_path() {
		let path = Path::new("/some/dir/000000010000000000000002.sql");
		assert!(file_name_ge(path, "000000010000000000000001.sql"));
		assert!(file_name_ge(path, "000000010000000000000002.sql"));
		assert!(!file_name_ge(path, "000000010000000000000003.sql"));
	}

	#[test]
	fn find_transaction_end_locates_the_closing_commit() {
		let lines = vec!["-- BEGIN 1@0/1", "PREPARE pgf_abc AS INSERT INTO t VALUES ($1);", "EXECUTE pgf_abc(1);", "-- COMMIT 1@0/2"];
		assert_eq!(find_transaction_end(&lines, 0), Some(3));
	}

	#[test]
	fn find_transaction_end_returns_none_when_commit_not_yet_written() {
		let lines = vec!["-- BEGIN 1@0/1", "PREPARE pgf_abc AS INSERT INTO t VALUES ($1);"];
		assert_eq!(find_transaction_end(&lines, 0), None);
	}

	#[test]
	fn find_transaction_end_matches_a_rollback_marker_too() {
		let lines = vec!["-- BEGIN 1@0/1", "-- ROLLBACK 1@0/2"];
		assert_eq!(find_transaction_end(&lines, 0), Some(1));
	}
}
