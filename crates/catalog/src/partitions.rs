// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::ids::Oid;
use pgferry_core::model::{Lifecycle, PartitionPredicate, TablePartition};
use rusqlite::params;

use crate::error::{Error, Result};
use crate::store::CatalogStore;

fn lifecycle_tag(lifecycle: Lifecycle) -> &'static str {
	match lifecycle {
		Lifecycle::Pending => "pending",
		Lifecycle::InProgress => "in_progress",
		Lifecycle::Done => "done",
		Lifecycle::Skipped => "skipped",
		Lifecycle::Failed => "failed",
	}
}

fn parse_lifecycle(tag: &str) -> Result<Lifecycle> {
	Ok(match tag {
		"pending" => Lifecycle::Pending,
		"in_progress" => Lifecycle::InProgress,
		"done" => Lifecycle::Done,
		"skipped" => Lifecycle::Skipped,
		"failed" => Lifecycle::Failed,
		other => return Err(Error::Corrupt(format!("unknown table_partition.lifecycle {other:?}"))),
	})
}

impl CatalogStore {
	pub fn upsert_partition(&self, partition: &TablePartition) -> Result<()> {
		let predicate_json = serde_json::to_string(&partition.predicate)
			.map_err(|e| Error::Corrupt(format!("partition predicate did not serialize: {e}")))?;
		let conn = self.conn.lock();
		conn.execute(
			"INSERT INTO table_partition (table_oid, part_number, total_parts, predicate_json, lifecycle)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(table_oid, part_number) DO UPDATE SET
                total_parts = excluded.total_parts,
                predicate_json = excluded.predicate_json,
                lifecycle = excluded.lifecycle",
			params![
				partition.table_oid.0,
				partition.part_number,
				partition.total_parts,
				predicate_json,
				lifecycle_tag(partition.lifecycle),
			],
		)?;
		Ok(())
	}

	pub fn list_partitions(&self, table_oid: Oid) -> Result<Vec<TablePartition>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare(
			"SELECT part_number, total_parts, predicate_json, lifecycle FROM table_partition
             WHERE table_oid = ?1 ORDER BY part_number ASC",
		)?;
		let rows = stmt.query_map(params![table_oid.0], |row| {
			let part_number: u32 = row.get(0)?;
			let total_parts: u32 = row.get(1)?;
			let predicate_json: String = row.get(2)?;
			let lifecycle: String = row.get(3)?;
			Ok((part_number, total_parts, predicate_json, lifecycle))
		})?;

		let mut out = Vec::new();
		for row in rows {
			let (part_number, total_parts, predicate_json, lifecycle) = row?;
			let predicate: PartitionPredicate = serde_json::from_str(&predicate_json)
				.map_err(|e| Error::Corrupt(format!("partition predicate did not parse: {e}")))?;
			out.push(TablePartition {
				table_oid,
				part_number,
				total_parts,
				predicate,
				lifecycle: parse_lifecycle(&lifecycle)?,
			});
		}
		Ok(out)
	}

	pub fn mark_partition_lifecycle(&self, table_oid: Oid, part_number: u32, lifecycle: Lifecycle) -> Result<()> {
		let conn = self.conn.lock();
		let updated = conn.execute(
			"UPDATE table_partition SET lifecycle = ?1 WHERE table_oid = ?2 AND part_number = ?3",
			params![lifecycle_tag(lifecycle), table_oid.0, part_number],
		)?;
		if updated == 0 {
			return Err(Error::NotFound(format!("partition {}/{}", table_oid.0, part_number)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partitions_round_trip_through_json_predicate() {
		let store = CatalogStore::open_in_memory().unwrap();
		let partition = TablePartition {
			table_oid: Oid(7),
			part_number: 1,
			total_parts: 4,
			predicate: PartitionPredicate::IntRange {
				column: "id".into(),
				lower_inclusive: Some(100),
				upper_exclusive: Some(200),
			},
			lifecycle: Lifecycle::Pending,
		};
		store.upsert_partition(&partition).unwrap();

		let listed = store.list_partitions(Oid(7)).unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0], partition);
	}

	#[test]
	fn marking_missing_partition_errors() {
		let store = CatalogStore::open_in_memory().unwrap();
		assert!(store.mark_partition_lifecycle(Oid(1), 0, Lifecycle::Done).is_err());
	}
}
