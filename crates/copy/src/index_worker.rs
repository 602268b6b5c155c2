// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Index / Constraint Worker: builds indexes
//! concurrently, then promotes unique/primary indexes into constraints in a
//! second, shorter critical section.

use std::sync::Arc;

use pgferry_catalog::CatalogStore;
use pgferry_core::ids::Oid;
use pgferry_core::model::{ConstraintKind, IndexDef, Lifecycle};
use pgferry_queue::{Consumer, Job};
use tokio_postgres::{Client, NoTls};
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct IndexWorkerConfig {
	pub target_pguri: Arc<str>,
	pub fail_fast: bool,
}

#[instrument(skip_all, fields(worker_id))]
pub async fn run_index_worker(
	worker_id: usize,
	index_queue: Consumer<Job>,
	catalog: Arc<CatalogStore>,
	config: IndexWorkerConfig,
	token: pgferry_core::CancellationToken,
) -> Result<()> {
	loop {
		let queue = index_queue.clone();
		let wait_token = token.clone();
		let job = tokio::task::spawn_blocking(move || queue.blocking_receive(&wait_token))
			.await
			.expect("index queue receive task panicked");
		let Some(job) = job else {
			info!(worker_id, "index queue drained; worker exiting");
			return Ok(());
		};

		if let Err(error) = build_one_index(&catalog, &config, job.object).await {
			error!(worker_id, index_oid = job.object.0, %error, "index build failed");
			let _ = catalog.mark_index_lifecycle(job.object, Lifecycle::Failed);
			if config.fail_fast {
				warn!(worker_id, "fail-fast: signalling run cancellation");
				token.cancel();
				return Err(error);
			}
		}
	}
}

async fn build_one_index(catalog: &CatalogStore, config: &IndexWorkerConfig, index_oid: Oid) -> Result<()> {
	let index = find_index(catalog, index_oid)?;

	let (target, connection) = tokio_postgres::connect(&config.target_pguri, NoTls).await.map_err(Error::Target)?;
	tokio::spawn(async move {
		if let Err(error) = connection.await {
			tracing::warn!(?error, "index worker target session ended with an error");
		}
	});

	if !index_exists(&target, &index.name).await? {
		target.batch_execute(&index.create_statement).await.map_err(Error::Target)?;
	}

	if let Some(constraint) = catalog.constraint_for_index(index_oid)? {
		if !constraint_exists(&target, &constraint.name).await? {
			promote_to_constraint(&target, &index, &constraint.name, constraint.kind).await?;
		}
	}

	catalog.mark_index_lifecycle(index_oid, Lifecycle::Done)?;
	Ok(())
}

fn find_index(catalog: &CatalogStore, index_oid: Oid) -> Result<IndexDef> {
	catalog.index_by_oid(index_oid)?.ok_or_else(|| Error::UnknownObject(format!("index {}", index_oid.0)))
}

async fn index_exists(target: &Client, index_name: &str) -> Result<bool> {
	let row = target
		.query_opt("SELECT 1 FROM pg_class WHERE relname = $1 AND relkind = 'i'", &[&index_name])
		.await
		.map_err(Error::Target)?;
	Ok(row.is_some())
}

async fn constraint_exists(target: &Client, constraint_name: &str) -> Result<bool> {
	let row = target
		.query_opt("SELECT 1 FROM pg_constraint WHERE conname = $1", &[&constraint_name])
		.await
		.map_err(Error::Target)?;
	Ok(row.is_some())
}

/// Promotes an already-built index to a primary-key / unique constraint via
/// `ALTER TABLE ... ADD CONSTRAINT ... USING INDEX ...`, the two-step
/// protocol that avoids an exclusive table lock for the
/// whole index build. Foreign-key and exclusion constraints are left to the
/// post-data restore step and never reach this function.
async fn promote_to_constraint(
	target: &Client,
	index: &IndexDef,
	constraint_name: &str,
	kind: ConstraintKind,
) -> Result<()> {
	let keyword = match kind {
		ConstraintKind::Primary => "PRIMARY KEY",
		ConstraintKind::Unique => "UNIQUE",
		ConstraintKind::Exclusion | ConstraintKind::ForeignKey | ConstraintKind::Check => {
			// : only primary/unique constraints are promoted
			// here. Reaching this arm means the enumerator misclassified
			// an index's backing constraint.
			return Err(Error::UnknownObject(format!(
				"index {} backs a non-promotable constraint kind",
				index.oid.0
			)));
		}
	};
	let qualified_table = table_name_for_index(target, index).await?;
	let statement =
		format!("ALTER TABLE {qualified_table} ADD CONSTRAINT {constraint_name} {keyword} USING INDEX {}", index.name);
	target.batch_execute(&statement).await.map_err(Error::Target)?;
	Ok(())
}

async fn table_name_for_index(target: &Client, index: &IndexDef) -> Result<String> {
	let row = target
		.query_one(
			"SELECT n.nspname, t.relname FROM pg_class t
             JOIN pg_namespace n ON n.oid = t.relnamespace
             JOIN pg_index i ON i.indrelid = t.oid
             JOIN pg_class ic ON ic.oid = i.indexrelid
             WHERE ic.relname = $1",
			&[&index.name],
		)
		.await
		.map_err(Error::Target)?;
	let schema: String = row.get(0);
	let table: String = row.get(1);
	Ok(format!("{}.{}", pgferry_core::ids::quote_ident(&schema), pgferry_core::ids::quote_ident(&table)))
}
