// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Shells out to the external dump/restore tool pair: exit
//! code 0 means success, anything else is a fatal error surfaced with the
//! tool's captured stderr.

use std::path::Path;

use tokio::process::Command;
use tracing::{info, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
	PreData,
	PostData,
}

impl Section {
	fn flag(self) -> &'static str {
		match self {
			Section::PreData => "pre-data",
			Section::PostData => "post-data",
		}
	}
}

#[derive(Debug, Clone)]
pub struct ExternalToolsConfig {
	/// Path or name (resolved via `PATH`) of the dump binary.
	pub dump_tool: String,
	/// Path or name of the restore binary.
	pub restore_tool: String,
}

impl Default for ExternalToolsConfig {
	fn default() -> Self {
		Self { dump_tool: "pg_dump".to_string(), restore_tool: "pg_restore".to_string() }
	}
}

async fn run(tool: &str, args: &[&str]) -> Result<String> {
	let output =
		Command::new(tool).args(args).output().await.map_err(|source| Error::Spawn { tool: tool.to_string(), source })?;
	if !output.status.success() {
		return Err(Error::ToolFailed {
			tool: tool.to_string(),
			status: output.status.code().unwrap_or(-1),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		});
	}
	Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Dumps one section of `source_pguri` to `out_path` in the custom
/// archive format the restore tool expects.
#[instrument(skip(config), fields(out = %out_path.display()))]
pub async fn dump_section(config: &ExternalToolsConfig, source_pguri: &str, section: Section, out_path: &Path) -> Result<()> {
	info!(?section, "dumping section");
	run(
		&config.dump_tool,
		&["--format=custom", "--section", section.flag(), "--file", &out_path.to_string_lossy(), source_pguri],
	)
	.await?;
	Ok(())
}

/// Lists an archive's table of contents, for [`crate::toc::parse_toc`].
pub async fn list_toc(config: &ExternalToolsConfig, archive_path: &Path) -> Result<String> {
	run(&config.restore_tool, &["--list", &archive_path.to_string_lossy()]).await
}

/// Restores one section of `archive_path` into `target_pguri`, optionally
/// filtered by a `--use-list` file (the post-data filtering).
#[instrument(skip(config), fields(archive = %archive_path.display()))]
pub async fn restore_section(
	config: &ExternalToolsConfig,
	target_pguri: &str,
	section: Section,
	archive_path: &Path,
	filter_list_path: Option<&Path>,
) -> Result<()> {
	info!(?section, "restoring section");
	let mut args = vec!["--section".to_string(), section.flag().to_string(), "--dbname".to_string(), target_pguri.to_string()];
	if let Some(filter_path) = filter_list_path {
		args.push("--use-list".to_string());
		args.push(filter_path.to_string_lossy().into_owned());
	}
	args.push(archive_path.to_string_lossy().into_owned());
	let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
	run(&config.restore_tool, &arg_refs).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn section_flags_match_the_tool_pair_convention() {
		assert_eq!(Section::PreData.flag(), "pre-data");
		assert_eq!(Section::PostData.flag(), "post-data");
	}

	#[tokio::test]
	async fn a_nonexistent_tool_surfaces_a_spawn_error() {
		let config = ExternalToolsConfig { dump_tool: "pgferry-does-not-exist".to_string(), ..Default::default() };
		let dir = tempfile::tempdir().unwrap();
		let out_path = dir.path().join("pre.dump");
		let err = dump_section(&config, "postgres://x", Section::PreData, &out_path).await.unwrap_err();
		assert!(matches!(err, Error::Spawn { .. }));
	}

	#[tokio::test]
	async fn a_nonzero_exit_surfaces_tool_failed_with_stderr() {
		// `false` always exits 1 and writes nothing to stderr; close enough
		// to exercise the non-zero-exit path without depending on the real
		// dump/restore binaries being installed.
		let config = ExternalToolsConfig { dump_tool: "false".to_string(), ..Default::default() };
		let dir = tempfile::tempdir().unwrap();
		let out_path = dir.path().join("pre.dump");
		let err = dump_section(&config, "postgres://x", Section::PreData, &out_path).await.unwrap_err();
		assert!(matches!(err, Error::ToolFailed { .. }));
	}
}
