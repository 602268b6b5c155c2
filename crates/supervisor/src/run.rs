// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The step sequence: dump pre-data, restore it, enumerate
//! the schema under a shared snapshot, drain the copy/index/large-object
//! queues, reset sequences, restore the filtered post-data, and — when
//! `--follow` is set — hand off to the CDC pipeline until `endpos`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use pgferry_catalog::CatalogStore;
use pgferry_core::model::{Lifecycle, SourceObjectKind};
use pgferry_core::CancellationToken;
use pgferry_external::Section;
use pgferry_queue::{job_queue, Job};
use pgferry_replication::{
	connect_plain, drop_origin_if_exists, drop_slot_if_exists, ApplierConfig, ReceiverConfig, TransformerConfig,
};
use pgferry_schema::{EnumerationConfig, SchemaEnumerator};
use pgferry_snapshot::SnapshotCoordinator;
use tokio::task::JoinSet;
use tokio_postgres::NoTls;
use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::shutdown::ShutdownController;

/// Capacity given to the index and large-object queues, sized generously
/// since a `Job` is a handful of bytes and these queues must never apply
/// backpressure to the copy phase that feeds them: the index workers
/// don't start draining until the copy phase has finished.
const FANOUT_QUEUE_CAPACITY: usize = 65_536;

fn now_unix() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Runs one clone to completion, resuming from whatever progress the
/// catalog at `config.workdir` already recorded.
pub async fn run_clone(config: &SupervisorConfig, shutdown: &ShutdownController) -> Result<()> {
	config.workdir.ensure(config.timeline)?;
	let catalog = Arc::new(CatalogStore::open(config.workdir.catalog_db())?);
	catalog.register_process(std::process::id(), "supervisor", now_unix())?;
	catalog.init_sentinel(pgferry_core::Lsn::new(0))?;

	let graceful = shutdown.graceful_token();
	let fast = shutdown.fast_token();

	let result = run_clone_inner(config, &catalog, &graceful, &fast).await;

	catalog.unregister_process(std::process::id())?;
	result
}

async fn run_clone_inner(
	config: &SupervisorConfig,
	catalog: &Arc<CatalogStore>,
	graceful: &CancellationToken,
	fast: &CancellationToken,
) -> Result<()> {
	let run = &config.run;

	info!("dumping and restoring pre-data");
	pgferry_external::dump_section(&config.external_tools, &run.source_pguri, Section::PreData, &config.workdir.pre_dump())
		.await?;
	pgferry_external::restore_section(
		&config.external_tools,
		&run.target_pguri,
		Section::PreData,
		&config.workdir.pre_dump(),
		None,
	)
	.await?;

	let mut cdc_tasks: Vec<tokio::task::JoinHandle<pgferry_replication::Result<()>>> = Vec::new();
	let snapshot_coordinator;
	let snapshot_id: String = if run.follow {
		snapshot_coordinator = None;
		spawn_cdc_intake(config, catalog, graceful, &mut cdc_tasks)?;
		await_shared_snapshot(catalog, graceful).await?
	} else {
		let mut coordinator = SnapshotCoordinator::export(&run.source_pguri).await?;
		coordinator.keep_alive();
		let id = coordinator.distribute();
		catalog.set_shared_snapshot(&id)?;
		snapshot_coordinator = Some(coordinator);
		id
	};

	info!("enumerating source schema");
	let enum_source = pgferry_copy::open_source_session(&run.source_pguri, &snapshot_id).await.map_err(Error::Copy)?;
	let enumerator = SchemaEnumerator::new(
		&enum_source,
		catalog,
		EnumerationConfig {
			split_threshold_bytes: run.split_tables_threshold_bytes,
			split_max_parts: run.split_tables_max_parts,
			same_table_concurrency: run.same_table_concurrency,
			resume: run.resume,
		},
	);
	enumerator.enumerate().await?;
	drop(enum_source);

	let (copy_producer, copy_consumer) = job_queue::<Job>(FANOUT_QUEUE_CAPACITY);
	let (index_producer, index_consumer) = job_queue::<Job>(FANOUT_QUEUE_CAPACITY);
	let (lo_producer, lo_consumer) = job_queue::<Job>(FANOUT_QUEUE_CAPACITY);

	let tables = catalog.list_source_objects(SourceObjectKind::Table)?;
	for table in &tables {
		for partition in catalog.list_partitions(table.oid)? {
			if partition.lifecycle == Lifecycle::Done {
				continue;
			}
			let _ = copy_producer.send(Job::copy_table(table.oid, partition.part_number));
		}
	}
	copy_producer.close();

	let large_objects = catalog.list_source_objects(SourceObjectKind::LargeObject)?;
	for lo in &large_objects {
		if lo.lifecycle == Lifecycle::Done {
			continue;
		}
		let _ = lo_producer.send(Job::copy_large_object(lo.oid));
	}
	lo_producer.close();

	info!(jobs = run.table_jobs, "running table-copy workers");
	let table_config = pgferry_copy::TableWorkerConfig {
		source_pguri: Arc::from(run.source_pguri.as_str()),
		target_pguri: Arc::from(run.target_pguri.as_str()),
		snapshot_id: Arc::from(snapshot_id.as_str()),
		same_table_concurrency: run.same_table_concurrency,
		fail_fast: run.fail_fast,
	};
	let mut copy_pool = JoinSet::new();
	pgferry_copy::spawn_pool(&mut copy_pool, run.table_jobs, {
		let copy_consumer = copy_consumer.clone();
		let index_producer = index_producer.clone();
		let catalog = Arc::clone(catalog);
		let table_config = table_config.clone();
		let token = graceful.clone();
		move |worker_id| {
			pgferry_copy::run_table_copy_worker(
				worker_id,
				copy_consumer.clone(),
				index_producer.clone(),
				Arc::clone(&catalog),
				table_config.clone(),
				token.clone(),
			)
		}
	});
	run_pool_with_fast_cancel(copy_pool, fast, "table copy").await?;

	// Every index a completed table owns has been enqueued by now; no more
	// will ever arrive, so the index workers can be told to stop once
	// they've drained what's there.
	index_producer.close();

	info!(jobs = run.index_jobs, "running index/constraint workers");
	let index_config =
		pgferry_copy::IndexWorkerConfig { target_pguri: Arc::from(run.target_pguri.as_str()), fail_fast: run.fail_fast };
	let mut index_pool = JoinSet::new();
	pgferry_copy::spawn_pool(&mut index_pool, run.index_jobs, {
		let index_consumer = index_consumer.clone();
		let catalog = Arc::clone(catalog);
		let index_config = index_config.clone();
		let token = graceful.clone();
		move |worker_id| {
			pgferry_copy::run_index_worker(worker_id, index_consumer.clone(), Arc::clone(&catalog), index_config.clone(), token.clone())
		}
	});
	run_pool_with_fast_cancel(index_pool, fast, "index build").await?;

	if !large_objects.is_empty() {
		info!(jobs = run.large_object_jobs, "running large-object workers");
		let lo_config = pgferry_copy::LargeObjectWorkerConfig {
			source_pguri: Arc::from(run.source_pguri.as_str()),
			target_pguri: Arc::from(run.target_pguri.as_str()),
			snapshot_id: Arc::from(snapshot_id.as_str()),
			fail_fast: run.fail_fast,
		};
		let mut lo_pool = JoinSet::new();
		pgferry_copy::spawn_pool(&mut lo_pool, run.large_object_jobs, {
			let lo_consumer = lo_consumer.clone();
			let catalog = Arc::clone(catalog);
			let lo_config = lo_config.clone();
			let token = graceful.clone();
			move |worker_id| {
				pgferry_copy::run_large_object_worker(worker_id, lo_consumer.clone(), Arc::clone(&catalog), lo_config.clone(), token.clone())
			}
		});
		run_pool_with_fast_cancel(lo_pool, fast, "large object copy").await?;
	}

	info!("resetting sequences");
	let seq_source = pgferry_copy::open_source_session(&run.source_pguri, &snapshot_id).await.map_err(Error::Copy)?;
	let seq_target = connect_plain(&run.target_pguri).await.map_err(Error::Replication)?;
	pgferry_copy::reset_sequences(catalog, &seq_source, &seq_target).await.map_err(Error::Copy)?;
	drop(seq_source);

	drop(snapshot_coordinator);

	info!("dumping and restoring post-data");
	pgferry_external::dump_section(&config.external_tools, &run.source_pguri, Section::PostData, &config.workdir.post_dump())
		.await?;
	let already_created = already_created_set(catalog, &tables)?;
	let toc_listing = pgferry_external::list_toc(&config.external_tools, &config.workdir.post_dump()).await?;
	let toc = pgferry_external::parse_toc_strict(&toc_listing)?;
	let filtered = pgferry_external::build_post_data_filter(&toc, &already_created);
	tokio::fs::write(config.workdir.post_list(), pgferry_external::render_filter_list(&filtered)).await?;
	pgferry_external::restore_section(
		&config.external_tools,
		&run.target_pguri,
		Section::PostData,
		&config.workdir.post_dump(),
		Some(&config.workdir.post_list()),
	)
	.await?;

	info!("running final vacuum analyze");
	let (vacuum_client, connection) = tokio_postgres::connect(&run.target_pguri, NoTls).await.map_err(Error::Target)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			warn!(%error, "vacuum session connection task ended with an error");
		}
	});
	vacuum_client.batch_execute("VACUUM ANALYZE").await.map_err(Error::Target)?;

	if run.follow {
		run_cdc_apply_phase(config, catalog, graceful, fast, cdc_tasks).await?;
	}

	info!("run complete");
	Ok(())
}

/// Spawns the Receiver as a long-running task and a small polling loop that
/// repeatedly calls the one-shot Transformer, which is safe to call
/// repeatedly while the Receiver is still writing new segments.
fn spawn_cdc_intake(
	config: &SupervisorConfig,
	catalog: &Arc<CatalogStore>,
	token: &CancellationToken,
	tasks: &mut Vec<tokio::task::JoinHandle<pgferry_replication::Result<()>>>,
) -> Result<()> {
	let run = &config.run;

	pgferry_replication::ensure_statement_dir(&config.workdir.statement_dir(config.timeline))?;

	let receiver_config = ReceiverConfig {
		source_pguri: Arc::from(run.source_pguri.as_str()),
		slot_name: run.slot_name.clone(),
		output_plugin: output_plugin_name(run.output_plugin).to_string(),
		journal_dir: config.workdir.journal_dir(config.timeline),
		timeline: config.timeline,
		wal_segment_size: config.wal_segment_size,
		create_slot_if_missing: true,
		export_snapshot: true,
	};
	let receiver_catalog = Arc::clone(catalog);
	let receiver_token = token.clone();
	tasks.push(tokio::spawn(pgferry_replication::run_receiver(receiver_config, receiver_catalog, receiver_token)));

	let transformer_config =
		TransformerConfig { journal_dir: config.workdir.journal_dir(config.timeline), statement_dir: config.workdir.statement_dir(config.timeline) };
	let transformer_catalog = Arc::clone(catalog);
	let transformer_token = token.clone();
	tasks.push(tokio::spawn(async move {
		loop {
			if transformer_token.is_cancelled() {
				return Ok(());
			}
			let catalog = Arc::clone(&transformer_catalog);
			let config = transformer_config.clone();
			tokio::task::spawn_blocking(move || pgferry_replication::run_transformer(&catalog, &config))
				.await
				.expect("transformer task panicked")?;
			tokio::select! {
				_ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
				_ = transformer_token.cancelled() => return Ok(()),
			}
		}
	}));

	Ok(())
}

/// Polls the catalog for the snapshot identifier the Receiver writes once
/// it has created (or found) the replication slot, so the rest of the run
/// observes the exact same point-in-time the CDC stream starts from.
async fn await_shared_snapshot(catalog: &Arc<CatalogStore>, token: &CancellationToken) -> Result<String> {
	loop {
		if let Some(id) = catalog.get_shared_snapshot()? {
			return Ok(id);
		}
		if token.is_cancelled() {
			return Err(Error::Cancelled("snapshot export"));
		}
		tokio::time::sleep(std::time::Duration::from_millis(200)).await;
	}
}

fn output_plugin_name(plugin: pgferry_core::config::OutputPlugin) -> &'static str {
	match plugin {
		pgferry_core::config::OutputPlugin::Wal2Json => "wal2json",
		pgferry_core::config::OutputPlugin::TestDecoding => "test_decoding",
	}
}

/// Every `INDEX`/`CONSTRAINT` the index workers already built directly
///: primary-key and unique indexes promoted via `ALTER TABLE
/// ... ADD CONSTRAINT ... USING INDEX`. Everything else in the post-data
/// archive — foreign keys, checks, triggers, rules, plain indexes that
/// never finished — passes through the filter untouched.
fn already_created_set(catalog: &CatalogStore, tables: &[pgferry_core::model::SourceObject]) -> Result<HashSet<String>> {
	let mut set = HashSet::new();
	for table in tables {
		for index in catalog.list_indexes_for_table(table.oid)? {
			if index.lifecycle != Lifecycle::Done {
				continue;
			}
			match index.backs_constraint {
				None => {
					set.insert(format!("INDEX {} {}", table.qualified_name.schema, index.name));
				}
				Some(_) => {
					if let Some(constraint) = catalog.constraint_for_index(index.oid)? {
						set.insert(format!("CONSTRAINT {} {}", table.qualified_name.schema, constraint.name));
					}
				}
			}
		}
	}
	Ok(set)
}

/// Runs the applier to completion (or cancellation), then tears down the
/// CDC pipeline's server-side state: drops the slot and the replication
/// origin, and lets the receiver/transformer tasks wind down behind it.
async fn run_cdc_apply_phase(
	config: &SupervisorConfig,
	catalog: &Arc<CatalogStore>,
	graceful: &CancellationToken,
	fast: &CancellationToken,
	cdc_tasks: Vec<tokio::task::JoinHandle<pgferry_replication::Result<()>>>,
) -> Result<()> {
	let run = &config.run;
	catalog.set_apply(true)?;
	if let Some(endpos) = &run.endpos {
		let parsed: pgferry_core::Lsn = endpos.parse().map_err(|_| Error::Cancelled("endpos parse"))?;
		catalog.set_endpos(parsed)?;
	}

	info!("running CDC applier");
	let applier_config = ApplierConfig {
		target_pguri: Arc::from(run.target_pguri.as_str()),
		statement_dir: config.workdir.statement_dir(config.timeline),
		origin_name: run.origin.clone(),
		poll_interval: std::time::Duration::from_millis(500),
	};
	let applier_token = graceful.clone();
	let applier_catalog = Arc::clone(catalog);
	let mut applier_handle = tokio::spawn(pgferry_replication::run_applier(applier_config, applier_catalog, applier_token));

	tokio::select! {
		outcome = &mut applier_handle => {
			outcome.map_err(|_| Error::Cancelled("CDC applier"))?.map_err(Error::Replication)?;
		}
		_ = fast.cancelled() => {
			warn!("fast shutdown: aborting in-flight CDC apply");
			applier_handle.abort();
			return Err(Error::Cancelled("CDC applier"));
		}
	}

	info!("tearing down CDC slot and origin");
	let control = connect_plain(&run.source_pguri).await.map_err(Error::Replication)?;
	drop_slot_if_exists(&control, &run.slot_name).await.map_err(Error::Replication)?;
	let target = connect_plain(&run.target_pguri).await.map_err(Error::Replication)?;
	drop_origin_if_exists(&target, &run.origin).await.map_err(Error::Replication)?;

	graceful.cancel();
	for task in cdc_tasks {
		let _ = task.await;
	}

	Ok(())
}

/// Awaits `joinset` (via [`pgferry_copy::join_pool`]) racing against `fast`.
/// If `fast` fires first, `joinset`'s drop aborts every still-running
/// worker task — the escalated fast-shutdown mode.
async fn run_pool_with_fast_cancel(joinset: JoinSet<pgferry_copy::Result<()>>, fast: &CancellationToken, stage: &'static str) -> Result<()> {
	tokio::select! {
		result = pgferry_copy::join_pool(joinset) => result.map_err(Error::Copy),
		_ = fast.cancelled() => {
			warn!(stage, "fast shutdown: aborting in-flight workers");
			Err(Error::Cancelled(stage))
		}
	}
}
