// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Schema Enumerator: runs once under the shared
//! snapshot and populates the Catalog Store with the ordered work lists
//! every downstream component drains.

use pgferry_catalog::CatalogStore;
use pgferry_core::ids::{Oid, QualifiedName, quote_ident};
use pgferry_core::model::{
	ConstraintDef, ConstraintKind, IndexDef, Lifecycle, PartitionPredicate, SourceObject, SourceObjectKind,
	TablePartition,
};
use tokio_postgres::Client;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::partition_plan::{IntKeyRange, PhysicalExtent, plan_partitions};
use crate::queries;

/// Resource knobs that feed the partitioning decision.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationConfig {
	pub split_threshold_bytes: u64,
	pub split_max_parts: u32,
	pub same_table_concurrency: bool,
	/// `--resume`: preserve rows already marked `done` instead of
	/// overwriting them.
	pub resume: bool,
}

pub struct SchemaEnumerator<'a> {
	source: &'a Client,
	catalog: &'a CatalogStore,
	config: EnumerationConfig,
}

impl<'a> SchemaEnumerator<'a> {
	pub fn new(source: &'a Client, catalog: &'a CatalogStore, config: EnumerationConfig) -> Self {
		Self { source, catalog, config }
	}

	/// Runs every enumeration step, in the order lists them.
	#[instrument(skip(self), level = "info")]
	pub async fn enumerate(&self) -> Result<()> {
		self.enumerate_tables_and_partitions().await?;
		self.enumerate_indexes_and_constraints().await?;
		self.enumerate_sequences().await?;
		self.enumerate_large_objects().await?;
		self.enumerate_extensions().await?;
		self.enumerate_collations().await?;
		self.enumerate_dependency_edges().await?;
		info!("schema enumeration complete");
		Ok(())
	}

	async fn enumerate_tables_and_partitions(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_TABLES, &[]).await.map_err(Error::Query)?;

		for row in rows {
			let oid: u32 = row.get::<_, i64>(0) as u32;
			let schema_name: String = row.get(1);
			let table_name: String = row.get(2);
			let estimated_rows: i64 = row.get(3);
			let estimated_bytes: i64 = row.get(4);
			let relpages: i32 = row.get(5);

			let qualified = QualifiedName::new(&schema_name, &table_name);
			let object = SourceObject {
				oid: Oid(oid),
				kind: SourceObjectKind::Table,
				qualified_name: qualified.clone(),
				restore_list_name: format!("TABLE {schema_name} {table_name}"),
				ordering_key: estimated_rows,
				lifecycle: Lifecycle::Pending,
				error: None,
			};
			self.catalog.upsert_source_object(&object, self.config.resume)?;

			let predicates = self.plan_table_partitions(Oid(oid), &qualified, estimated_bytes as u64, relpages as u32).await?;
			for (part_number, predicate) in predicates.into_iter().enumerate() {
				self.catalog.upsert_partition(&TablePartition {
					table_oid: Oid(oid),
					part_number: part_number as u32,
					total_parts: 0, // patched below once the full count is known
					predicate,
					lifecycle: Lifecycle::Pending,
				})?;
			}
			// total_parts requires a second pass since it's only known once
			// every partition has been generated; cheap relative to the
			// per-table query traffic above.
			let total = self.catalog.list_partitions(Oid(oid))?.len() as u32;
			for mut partition in self.catalog.list_partitions(Oid(oid))? {
				partition.total_parts = total;
				self.catalog.upsert_partition(&partition)?;
			}
		}
		Ok(())
	}

	async fn plan_table_partitions(
		&self,
		table_oid: Oid,
		qualified: &QualifiedName,
		estimated_bytes: u64,
		relpages: u32,
	) -> Result<Vec<PartitionPredicate>> {
		if estimated_bytes <= self.config.split_threshold_bytes {
			return Ok(vec![PartitionPredicate::Single]);
		}

		let int_key_row = self.source.query_opt(queries::FIND_INT_KEY, &[&(table_oid.0 as i64)]).await.map_err(Error::Query)?;

		let int_key_bounds = match int_key_row {
			Some(row) => {
				let column: String = row.get(0);
				let min_max_sql = queries::MIN_MAX_TEMPLATE
					.replace("{column}", &quote_ident(&column))
					.replace("{table}", &qualified.quoted());
				let bounds_row = self.source.query_one(&min_max_sql, &[]).await.map_err(Error::Query)?;
				let min_value: Option<i64> = bounds_row.get(0);
				let max_value: Option<i64> = bounds_row.get(1);
				match (min_value, max_value) {
					(Some(min_value), Some(max_value)) => Some((column, min_value, max_value)),
					_ => None, // empty table under the snapshot; nothing to split
				}
			}
			None => None,
		};

		let plan = match &int_key_bounds {
			Some((column, min_value, max_value)) => plan_partitions(
				estimated_bytes,
				self.config.split_threshold_bytes,
				self.config.split_max_parts,
				Some(IntKeyRange { column, min_value: *min_value, max_value: *max_value }),
				None,
				self.config.same_table_concurrency,
			),
			None => plan_partitions(
				estimated_bytes,
				self.config.split_threshold_bytes,
				self.config.split_max_parts,
				None,
				Some(PhysicalExtent { relpages }),
				self.config.same_table_concurrency,
			),
		};
		Ok(plan)
	}

	async fn enumerate_indexes_and_constraints(&self) -> Result<()> {
		let constraint_rows = self.source.query(queries::LIST_CONSTRAINTS, &[]).await.map_err(Error::Query)?;
		// conindid -> (oid, name, kind, definition)
		let mut constraints_by_index = std::collections::HashMap::new();
		for row in &constraint_rows {
			let index_oid: i64 = row.get(1);
			let oid: i64 = row.get(0);
			let name: String = row.get(2);
			let contype: i8 = row.get(3);
			let definition: String = row.get(4);
			constraints_by_index.insert(index_oid as u32, (oid as u32, name, contype, definition));
		}

		let index_rows = self.source.query(queries::LIST_INDEXES, &[]).await.map_err(Error::Query)?;
		for row in index_rows {
			let index_oid: i64 = row.get(0);
			let table_oid: i64 = row.get(1);
			let index_name: String = row.get(2);
			let create_statement: String = row.get(3);

			let backs_constraint = constraints_by_index.get(&(index_oid as u32)).map(|(oid, ..)| Oid(*oid));

			self.catalog.upsert_index(&IndexDef {
				oid: Oid(index_oid as u32),
				table_oid: Oid(table_oid as u32),
				name: index_name,
				create_statement,
				backs_constraint,
				lifecycle: Lifecycle::Pending,
			})?;

			if let Some((constraint_oid, name, contype, definition)) = constraints_by_index.get(&(index_oid as u32)) {
				self.catalog.upsert_constraint(&ConstraintDef {
					oid: Oid(*constraint_oid),
					index_oid: Oid(index_oid as u32),
					name: name.clone(),
					kind: constraint_kind_from_contype(*contype),
					definition: definition.clone(),
				})?;
			}
		}
		Ok(())
	}

	async fn enumerate_sequences(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_SEQUENCES, &[]).await.map_err(Error::Query)?;
		for row in rows {
			let oid: i64 = row.get(0);
			let schema_name: String = row.get(1);
			let seq_name: String = row.get(2);
			self.catalog.upsert_source_object(
				&SourceObject {
					oid: Oid(oid as u32),
					kind: SourceObjectKind::Sequence,
					qualified_name: QualifiedName::new(&schema_name, &seq_name),
					restore_list_name: format!("SEQUENCE {schema_name} {seq_name}"),
					ordering_key: 0,
					lifecycle: Lifecycle::Pending,
					error: None,
				},
				self.config.resume,
			)?;
		}
		Ok(())
	}

	async fn enumerate_large_objects(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_LARGE_OBJECTS, &[]).await.map_err(Error::Query)?;
		for row in rows {
			let oid: i64 = row.get(0);
			self.catalog.upsert_source_object(
				&SourceObject {
					oid: Oid(oid as u32),
					kind: SourceObjectKind::LargeObject,
					qualified_name: QualifiedName::new("pg_catalog", oid.to_string()),
					restore_list_name: format!("BLOB {oid}"),
					ordering_key: 0,
					lifecycle: Lifecycle::Pending,
					error: None,
				},
				self.config.resume,
			)?;
		}
		Ok(())
	}

	async fn enumerate_extensions(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_EXTENSIONS, &[]).await.map_err(Error::Query)?;
		for row in rows {
			let oid: i64 = row.get(0);
			let name: String = row.get(1);
			self.catalog.upsert_source_object(
				&SourceObject {
					oid: Oid(oid as u32),
					kind: SourceObjectKind::Extension,
					qualified_name: QualifiedName::new("pg_catalog", &name),
					restore_list_name: format!("EXTENSION {name}"),
					ordering_key: 0,
					lifecycle: Lifecycle::Pending,
					error: None,
				},
				self.config.resume,
			)?;
		}
		Ok(())
	}

	async fn enumerate_collations(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_COLLATIONS, &[]).await.map_err(Error::Query)?;
		for row in rows {
			let oid: i64 = row.get(0);
			let schema_name: String = row.get(1);
			let name: String = row.get(2);
			self.catalog.upsert_source_object(
				&SourceObject {
					oid: Oid(oid as u32),
					kind: SourceObjectKind::Collation,
					qualified_name: QualifiedName::new(&schema_name, &name),
					restore_list_name: format!("COLLATION {schema_name} {name}"),
					ordering_key: 0,
					lifecycle: Lifecycle::Pending,
					error: None,
				},
				self.config.resume,
			)?;
		}
		Ok(())
	}

	async fn enumerate_dependency_edges(&self) -> Result<()> {
		let rows = self.source.query(queries::LIST_DEPEND_EDGES, &[]).await.map_err(Error::Query)?;
		for row in rows {
			let from_oid: i64 = row.get(0);
			let to_oid: i64 = row.get(1);
			self.catalog.upsert_dependency_edge(Oid(from_oid as u32), Oid(to_oid as u32))?;
		}
		Ok(())
	}
}

fn constraint_kind_from_contype(contype: i8) -> ConstraintKind {
	match contype as u8 as char {
		'p' => ConstraintKind::Primary,
		'u' => ConstraintKind::Unique,
		'x' => ConstraintKind::Exclusion,
		'f' => ConstraintKind::ForeignKey,
		'c' => ConstraintKind::Check,
		_ => ConstraintKind::Check,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn contype_maps_to_the_right_constraint_kind() {
		assert_eq!(constraint_kind_from_contype(b'p' as i8), ConstraintKind::Primary);
		assert_eq!(constraint_kind_from_contype(b'u' as i8), ConstraintKind::Unique);
		assert_eq!(constraint_kind_from_contype(b'f' as i8), ConstraintKind::ForeignKey);
		assert_eq!(constraint_kind_from_contype(b'x' as i8), ConstraintKind::Exclusion);
	}
}
