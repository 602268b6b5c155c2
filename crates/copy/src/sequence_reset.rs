// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Sequence Reset Worker: after data copy and before
//! post-data restore, sets each target sequence to its source value.
//! Sequences owned by identity columns are handled through the same path.

use pgferry_catalog::CatalogStore;
use pgferry_core::ids::QualifiedName;
use pgferry_core::model::{Lifecycle, SourceObjectKind};
use tokio_postgres::Client;
use tracing::{info, instrument};

use crate::error::{Error, Result};

/// Reads the current value of every sequence enumerated in the catalog
/// (under the shared snapshot, via `source`) and sets the target's sequence
/// to match. Unconditional — classifies this as always
/// re-runnable, unlike index/constraint creation.
#[instrument(skip_all)]
pub async fn reset_sequences(catalog: &CatalogStore, source: &Client, target: &Client) -> Result<()> {
	let sequences = catalog.list_source_objects(SourceObjectKind::Sequence)?;
	for sequence in sequences {
		let value = read_source_value(source, &sequence.qualified_name).await?;
		set_target_value(target, &sequence.qualified_name, value).await?;
		catalog.mark_lifecycle(SourceObjectKind::Sequence, sequence.oid, Lifecycle::Done, None)?;
		info!(sequence = %sequence.qualified_name, value, "sequence reset");
	}
	Ok(())
}

async fn read_source_value(source: &Client, name: &QualifiedName) -> Result<i64> {
	let row = source.query_one(&format!("SELECT last_value FROM {}", name.quoted()), &[]).await.map_err(Error::Source)?;
	Ok(row.get(0))
}

async fn set_target_value(target: &Client, name: &QualifiedName, value: i64) -> Result<()> {
	target
		.execute("SELECT setval($1::regclass, $2)", &[&name.quoted(), &value])
		.await
		.map_err(Error::Target)?;
	Ok(())
}
