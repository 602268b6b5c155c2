// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The textual CLI surface: a `clone` subcommand that drives one
//! run through the supervisor, and a `sentinel` subcommand external tooling
//! uses to read or poke the on-disk sentinel row directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pgferry_catalog::CatalogStore;
use pgferry_core::config::{
	ConnectionSettings, OutputPlugin, RunConfig, ENV_FAIL_FAST, ENV_INDEX_JOBS, ENV_LARGE_OBJECT_JOBS, ENV_ORIGIN,
	ENV_OUTPUT_PLUGIN, ENV_RESTORE_JOBS, ENV_SLOT_NAME, ENV_SOURCE_PGURI, ENV_SPLIT_TABLES_MAX_PARTS,
	ENV_SPLIT_TABLES_THRESHOLD, ENV_TABLE_JOBS, ENV_TARGET_PGURI,
};
use pgferry_core::Lsn;
use pgferry_supervisor::{ShutdownController, SupervisorConfig};
use tracing::error;

#[derive(Parser)]
#[command(name = "pgferry", version, about = "Parallel clone and CDC replication for a PostgreSQL-compatible source")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Runs (or resumes) one clone, optionally followed by live CDC replay.
	Clone(CloneArgs),
	/// Reads or updates the sentinel row of an existing work directory.
	Sentinel(SentinelArgs),
}

#[derive(Parser)]
struct CloneArgs {
	/// Work directory holding the catalog store, archives, and CDC journal.
	#[arg(long, env = "PGFERRY_WORKDIR")]
	workdir: PathBuf,

	#[arg(long, env = ENV_SOURCE_PGURI)]
	source: String,

	#[arg(long, env = ENV_TARGET_PGURI)]
	target: String,

	#[arg(long, env = ENV_TABLE_JOBS, default_value_t = 4)]
	table_jobs: usize,

	#[arg(long, env = ENV_INDEX_JOBS, default_value_t = 4)]
	index_jobs: usize,

	#[arg(long, env = ENV_RESTORE_JOBS, default_value_t = 4)]
	restore_jobs: usize,

	#[arg(long, env = ENV_LARGE_OBJECT_JOBS, default_value_t = 2)]
	large_object_jobs: usize,

	/// Tables larger than this many bytes are split into partitions.
	#[arg(long, env = ENV_SPLIT_TABLES_THRESHOLD, default_value_t = 400 * 1024 * 1024)]
	split_tables_larger_than: u64,

	#[arg(long, env = ENV_SPLIT_TABLES_MAX_PARTS, default_value_t = 4)]
	split_tables_max_parts: u32,

	/// Allow physical-range partitioning when no usable integer key exists.
	#[arg(long)]
	same_table_concurrency: bool,

	#[arg(long, env = ENV_FAIL_FAST)]
	fail_fast: bool,

	/// Preserve rows already marked done in a prior, interrupted run.
	#[arg(long)]
	resume: bool,

	/// After the base copy finishes, keep replaying source changes via CDC.
	#[arg(long)]
	follow: bool,

	#[arg(long, env = ENV_OUTPUT_PLUGIN, default_value = "wal2json")]
	output_plugin: String,

	#[arg(long, env = ENV_SLOT_NAME, default_value = "pgferry")]
	slot_name: String,

	#[arg(long, env = ENV_ORIGIN, default_value = "pgferry")]
	origin: String,

	/// Stop CDC replay once this LSN has been applied. Only meaningful with
	/// `--follow`.
	#[arg(long)]
	endpos: Option<String>,

	#[arg(long, default_value_t = 1)]
	timeline: u32,

	#[arg(long, env = "PGFERRY_DUMP_TOOL", default_value = "pg_dump")]
	dump_tool: String,

	#[arg(long, env = "PGFERRY_RESTORE_TOOL", default_value = "pg_restore")]
	restore_tool: String,
}

impl CloneArgs {
	fn into_supervisor_config(self) -> Result<SupervisorConfig, String> {
		let output_plugin = match self.output_plugin.as_str() {
			"wal2json" => OutputPlugin::Wal2Json,
			"test_decoding" => OutputPlugin::TestDecoding,
			other => return Err(format!("unknown output plugin {other:?}, expected wal2json or test_decoding")),
		};

		let run = RunConfig {
			source_pguri: self.source,
			target_pguri: self.target,
			table_jobs: self.table_jobs,
			index_jobs: self.index_jobs,
			restore_jobs: self.restore_jobs,
			large_object_jobs: self.large_object_jobs,
			split_tables_threshold_bytes: self.split_tables_larger_than,
			split_tables_max_parts: self.split_tables_max_parts,
			same_table_concurrency: self.same_table_concurrency,
			fail_fast: self.fail_fast,
			resume: self.resume,
			follow: self.follow,
			output_plugin,
			slot_name: self.slot_name,
			origin: self.origin,
			endpos: self.endpos,
			connection: ConnectionSettings::default(),
		};

		let mut config = SupervisorConfig::new(run, self.workdir);
		config.timeline = self.timeline;
		config.external_tools.dump_tool = self.dump_tool;
		config.external_tools.restore_tool = self.restore_tool;
		Ok(config)
	}
}

#[derive(Parser)]
struct SentinelArgs {
	/// Work directory of the run whose sentinel should be inspected.
	#[arg(long, env = "PGFERRY_WORKDIR")]
	workdir: PathBuf,

	#[command(subcommand)]
	action: SentinelAction,
}

#[derive(Subcommand)]
enum SentinelAction {
	/// Prints every sentinel field.
	Get,
	/// Updates one sentinel field.
	Set {
		#[command(subcommand)]
		field: SentinelField,
	},
}

#[derive(Subcommand)]
enum SentinelField {
	/// Sets the LSN replay should (re)start from. Only meaningful before a
	/// slot exists; has no effect on an already-initialized sentinel.
	Startpos { lsn: String },
	/// Sets the LSN at which CDC replay should stop.
	Endpos { lsn: String },
	/// Flips the apply gate. May only move from false to true.
	Apply { value: bool },
	/// Convenience for `apply false`: puts the run back into prefetch mode
	/// (receiver/transformer keep running, the applier keeps sleeping).
	Prefetch,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let cli = Cli::parse();

	let runtime = match tokio::runtime::Builder::new_multi_thread().worker_threads(num_cpus::get()).enable_all().build() {
		Ok(runtime) => runtime,
		Err(error) => {
			eprintln!("failed to start async runtime: {error}");
			return ExitCode::FAILURE;
		}
	};

	let result = match cli.command {
		Command::Clone(args) => runtime.block_on(run_clone(args)),
		Command::Sentinel(args) => run_sentinel(args),
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(message) => {
			error!("{message}");
			ExitCode::FAILURE
		}
	}
}

async fn run_clone(args: CloneArgs) -> Result<(), String> {
	let config = args.into_supervisor_config()?;
	let shutdown = ShutdownController::install().map_err(|error| format!("failed to install signal handlers: {error}"))?;
	pgferry_supervisor::run_clone(&config, &shutdown).await.map_err(|error| error.to_string())
}

fn run_sentinel(args: SentinelArgs) -> Result<(), String> {
	let db_path = args.workdir.join("schema").join("source.db");
	let catalog = CatalogStore::open(&db_path).map_err(|error| format!("opening catalog store at {}: {error}", db_path.display()))?;

	match args.action {
		SentinelAction::Get => {
			let sentinel = catalog.read_sentinel().map_err(|error| error.to_string())?;
			println!("startpos   = {}", sentinel.startpos);
			println!("endpos     = {}", sentinel.endpos.map(|lsn| lsn.to_string()).unwrap_or_else(|| "-".to_string()));
			println!("write_lsn  = {}", sentinel.write_lsn);
			println!("flush_lsn  = {}", sentinel.flush_lsn);
			println!("replay_lsn = {}", sentinel.replay_lsn);
			println!("apply      = {}", sentinel.apply);
			Ok(())
		}
		SentinelAction::Set { field } => match field {
			SentinelField::Startpos { lsn } => {
				let lsn: Lsn = lsn.parse().map_err(|_| format!("invalid lsn: {lsn}"))?;
				catalog.init_sentinel(lsn).map_err(|error| error.to_string())
			}
			SentinelField::Endpos { lsn } => {
				let lsn: Lsn = lsn.parse().map_err(|_| format!("invalid lsn: {lsn}"))?;
				catalog.set_endpos(lsn).map_err(|error| error.to_string())
			}
			SentinelField::Apply { value } => catalog.set_apply(value).map_err(|error| error.to_string()),
			SentinelField::Prefetch => catalog.set_apply(false).map_err(|error| error.to_string()),
		},
	}
}
