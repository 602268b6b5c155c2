// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Everything the supervisor needs to drive one run: the resource knobs of
//! [`pgferry_core::config::RunConfig`], the work directory layout, and the
//! external dump/restore tool configuration.

use pgferry_core::config::RunConfig;
use pgferry_external::ExternalToolsConfig;

use crate::workdir::WorkDir;

/// Full configuration for one supervisor run, combining the resource/CDC
/// knobs of [`RunConfig`] with the filesystem and external-tool wiring the
/// step sequence of needs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	pub run: RunConfig,
	pub workdir: WorkDir,
	pub external_tools: ExternalToolsConfig,
	/// Source timeline ID; almost always 1 outside of point-in-time
	/// recovery scenarios. Threaded through so journal segment names match
	/// the source's own WAL file names.
	pub timeline: u32,
	pub wal_segment_size: u64,
}

impl SupervisorConfig {
	pub fn new(run: RunConfig, workdir: impl Into<std::path::PathBuf>) -> Self {
		Self {
			run,
			workdir: WorkDir::new(workdir),
			external_tools: ExternalToolsConfig::default(),
			timeline: 1,
			wal_segment_size: pgferry_core::lsn::DEFAULT_WAL_SEGMENT_SIZE,
		}
	}
}
