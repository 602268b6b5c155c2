// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::ids::Oid;
use pgferry_core::model::{IndexDef, Lifecycle};
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
		other => return Err(Error::Corrupt(format!("unknown index_def.lifecycle {other:?}"))),
	})
}

impl CatalogStore {
	pub fn upsert_index(&self, index: &IndexDef) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"INSERT INTO index_def (oid, table_oid, name, create_statement, backs_constraint, lifecycle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(oid) DO UPDATE SET
                table_oid = excluded.table_oid,
                name = excluded.name,
                create_statement = excluded.create_statement,
                backs_constraint = excluded.backs_constraint,
                lifecycle = excluded.lifecycle",
			params![
				index.oid.0,
				index.table_oid.0,
				index.name,
				index.create_statement,
				index.backs_constraint.map(|o| o.0),
				lifecycle_tag(index.lifecycle),
			],
		)?;
		Ok(())
	}

	pub fn list_indexes_for_table(&self, table_oid: Oid) -> Result<Vec<IndexDef>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare(
			"SELECT oid, name, create_statement, backs_constraint, lifecycle FROM index_def
             WHERE table_oid = ?1 ORDER BY oid ASC",
		)?;
		let rows = stmt.query_map(params![table_oid.0], |row| {
			let oid: u32 = row.get(0)?;
			let name: String = row.get(1)?;
			let create_statement: String = row.get(2)?;
			let backs_constraint: Option<u32> = row.get(3)?;
			let lifecycle: String = row.get(4)?;
			Ok((oid, name, create_statement, backs_constraint, lifecycle))
		})?;

		let mut out = Vec::new();
		for row in rows {
			let (oid, name, create_statement, backs_constraint, lifecycle) = row?;
			out.push(IndexDef {
				oid: Oid(oid),
				table_oid,
				name,
				create_statement,
				backs_constraint: backs_constraint.map(Oid),
				lifecycle: parse_lifecycle(&lifecycle)?,
			});
		}
		Ok(out)
	}

	/// Looks up one index by its own OID, regardless of owning table. Used
	/// by the index worker, which only knows the job's object identifier.
	pub fn index_by_oid(&self, oid: Oid) -> Result<Option<IndexDef>> {
		use rusqlite::OptionalExtension;
		let conn = self.conn.lock();
		let row = conn
			.query_row(
				"SELECT oid, table_oid, name, create_statement, backs_constraint, lifecycle FROM index_def WHERE oid = ?1",
				params![oid.0],
				|row| {
					let oid: u32 = row.get(0)?;
					let table_oid: u32 = row.get(1)?;
					let name: String = row.get(2)?;
					let create_statement: String = row.get(3)?;
					let backs_constraint: Option<u32> = row.get(4)?;
					let lifecycle: String = row.get(5)?;
					Ok((oid, table_oid, name, create_statement, backs_constraint, lifecycle))
				},
			)
			.optional()?;
		match row {
			None => Ok(None),
			Some((oid, table_oid, name, create_statement, backs_constraint, lifecycle)) => Ok(Some(IndexDef {
				oid: Oid(oid),
				table_oid: Oid(table_oid),
				name,
				create_statement,
				backs_constraint: backs_constraint.map(Oid),
				lifecycle: parse_lifecycle(&lifecycle)?,
			})),
		}
	}

	pub fn mark_index_lifecycle(&self, oid: Oid, lifecycle: Lifecycle) -> Result<()> {
		let conn = self.conn.lock();
		let updated = conn.execute(
			"UPDATE index_def SET lifecycle = ?1 WHERE oid = ?2",
			params![lifecycle_tag(lifecycle), oid.0],
		)?;
		if updated == 0 {
			return Err(Error::NotFound(format!("index {}", oid.0)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(oid: u32, table_oid: u32) -> IndexDef {
		IndexDef {
			oid: Oid(oid),
			table_oid: Oid(table_oid),
			name: format!("idx_{oid}"),
			create_statement: format!("CREATE INDEX idx_{oid} ON public.t({oid})"),
			backs_constraint: None,
			lifecycle: Lifecycle::Pending,
		}
	}

	#[test]
	fn indexes_are_scoped_to_their_table() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_index(&sample(1, 10)).unwrap();
		store.upsert_index(&sample(2, 20)).unwrap();

		assert_eq!(store.list_indexes_for_table(Oid(10)).unwrap().len(), 1);
		assert_eq!(store.list_indexes_for_table(Oid(20)).unwrap().len(), 1);
		assert_eq!(store.list_indexes_for_table(Oid(30)).unwrap().len(), 0);
	}

	#[test]
	fn index_by_oid_finds_regardless_of_owning_table() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_index(&sample(1, 10)).unwrap();

		assert_eq!(store.index_by_oid(Oid(1)).unwrap(), Some(sample(1, 10)));
		assert!(store.index_by_oid(Oid(2)).unwrap().is_none());
	}
}
