// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The environment variables recognized by pgferry, named as
//! constants so the CLI crate and every component agree on spelling.

pub const ENV_SOURCE_PGURI: &str = "PGFERRY_SOURCE_PGURI";
pub const ENV_TARGET_PGURI: &str = "PGFERRY_TARGET_PGURI";
pub const ENV_TABLE_JOBS: &str = "PGFERRY_TABLE_JOBS";
pub const ENV_INDEX_JOBS: &str = "PGFERRY_INDEX_JOBS";
pub const ENV_RESTORE_JOBS: &str = "PGFERRY_RESTORE_JOBS";
pub const ENV_LARGE_OBJECT_JOBS: &str = "PGFERRY_LARGE_OBJECT_JOBS";
pub const ENV_SPLIT_TABLES_THRESHOLD: &str = "PGFERRY_SPLIT_TABLES_LARGER_THAN";
pub const ENV_SPLIT_TABLES_MAX_PARTS: &str = "PGFERRY_SPLIT_TABLES_MAX_PARTS";
pub const ENV_FAIL_FAST: &str = "PGFERRY_FAIL_FAST";
pub const ENV_OUTPUT_PLUGIN: &str = "PGFERRY_OUTPUT_PLUGIN";
pub const ENV_SLOT_NAME: &str = "PGFERRY_SLOT_NAME";
pub const ENV_ORIGIN: &str = "PGFERRY_ORIGIN";
pub const ENV_SNAPSHOT: &str = "PGFERRY_SNAPSHOT";

/// Connection timeout / retry / keepalive settings applied to every database
/// session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionSettings {
	pub connect_timeout_secs: u64,
	pub total_retry_budget_secs: u64,
	pub tcp_keepalive_secs: u64,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self { connect_timeout_secs: 10, total_retry_budget_secs: 120, tcp_keepalive_secs: 30 }
	}
}

/// Resource/concurrency configuration shared by the supervisor and every
/// worker pool it spawns.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
	pub source_pguri: String,
	pub target_pguri: String,
	pub table_jobs: usize,
	pub index_jobs: usize,
	pub restore_jobs: usize,
	pub large_object_jobs: usize,
	pub split_tables_threshold_bytes: u64,
	pub split_tables_max_parts: u32,
	pub same_table_concurrency: bool,
	pub fail_fast: bool,
	pub resume: bool,
	pub follow: bool,
	pub output_plugin: OutputPlugin,
	pub slot_name: String,
	pub origin: String,
	pub endpos: Option<String>,
	pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPlugin {
	Wal2Json,
	TestDecoding,
}

impl Default for RunConfig {
	fn default() -> Self {
		Self {
			source_pguri: String::new(),
			target_pguri: String::new(),
			table_jobs: 4,
			index_jobs: 4,
			restore_jobs: 4,
			large_object_jobs: 2,
			split_tables_threshold_bytes: 400 * 1024 * 1024,
			split_tables_max_parts: 4,
			same_table_concurrency: false,
			fail_fast: false,
			resume: false,
			follow: false,
			output_plugin: OutputPlugin::Wal2Json,
			slot_name: "pgferry".to_string(),
			origin: "pgferry".to_string(),
			endpos: None,
			connection: ConnectionSettings::default(),
		}
	}
}
