// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::ids::{Oid, QualifiedName};
use pgferry_core::model::{Lifecycle, SourceObject, SourceObjectKind};
use rusqlite::{OptionalExtension, params};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::store::CatalogStore;

fn kind_tag(kind: SourceObjectKind) -> &'static str {
	match kind {
		SourceObjectKind::Table => "table",
		SourceObjectKind::PartitionOfTable => "partition_of_table",
		SourceObjectKind::Index => "index",
		SourceObjectKind::Constraint => "constraint",
		SourceObjectKind::Sequence => "sequence",
		SourceObjectKind::LargeObject => "large_object",
		SourceObjectKind::Extension => "extension",
		SourceObjectKind::Collation => "collation",
		SourceObjectKind::DependEdge => "depend_edge",
	}
}

fn parse_kind(tag: &str) -> Result<SourceObjectKind> {
	Ok(match tag {
		"table" => SourceObjectKind::Table,
		"partition_of_table" => SourceObjectKind::PartitionOfTable,
		"index" => SourceObjectKind::Index,
		"constraint" => SourceObjectKind::Constraint,
		"sequence" => SourceObjectKind::Sequence,
		"large_object" => SourceObjectKind::LargeObject,
		"extension" => SourceObjectKind::Extension,
		"collation" => SourceObjectKind::Collation,
		"depend_edge" => SourceObjectKind::DependEdge,
		other => return Err(Error::Corrupt(format!("unknown source_object.kind {other:?}"))),
	})
}

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
		other => return Err(Error::Corrupt(format!("unknown source_object.lifecycle {other:?}"))),
	})
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SourceObject, String, String)> {
	let oid: u32 = row.get("oid")?;
	let kind: String = row.get("kind")?;
	let schema_name: String = row.get("schema_name")?;
	let object_name: String = row.get("object_name")?;
	let restore_list_name: String = row.get("restore_list_name")?;
	let ordering_key: i64 = row.get("ordering_key")?;
	let lifecycle: String = row.get("lifecycle")?;
	let error: Option<String> = row.get("error")?;
	Ok((
		SourceObject {
			oid: Oid(oid),
			kind: SourceObjectKind::Table, // placeholder, patched by caller
			qualified_name: QualifiedName::new(schema_name, object_name),
			restore_list_name,
			ordering_key,
			lifecycle: Lifecycle::Pending, // placeholder, patched by caller
			error,
		},
		kind,
		lifecycle,
	))
}

impl CatalogStore {
	/// Idempotent unless `preserve_done` is set, in which case rows already
	/// marked `Done` are left untouched (the `--resume` behavior).
	#[instrument(skip(self), level = "debug")]
	pub fn upsert_source_object(&self, object: &SourceObject, preserve_done: bool) -> Result<()> {
		let conn = self.conn.lock();
		if preserve_done {
			let existing: Option<String> = conn
				.query_row(
					"SELECT lifecycle FROM source_object WHERE kind = ?1 AND oid = ?2",
					params![kind_tag(object.kind), object.oid.0],
					|row| row.get(0),
				)
				.optional()?;
			if existing.as_deref() == Some("done") {
				return Ok(());
			}
		}
		conn.execute(
			"INSERT INTO source_object (oid, kind, schema_name, object_name, restore_list_name, ordering_key, lifecycle, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(kind, oid) DO UPDATE SET
                schema_name = excluded.schema_name,
                object_name = excluded.object_name,
                restore_list_name = excluded.restore_list_name,
                ordering_key = excluded.ordering_key,
                lifecycle = excluded.lifecycle,
                error = excluded.error",
			params![
				object.oid.0,
				kind_tag(object.kind),
				object.qualified_name.schema,
				object.qualified_name.name,
				object.restore_list_name,
				object.ordering_key,
				lifecycle_tag(object.lifecycle),
				object.error,
			],
		)?;
		Ok(())
	}

	/// All objects of one kind, ordered by `ordering_key DESC` then `oid`
	/// (tables are ordered by estimated row count descending, ties broken
	/// by identifier).
	pub fn list_source_objects(&self, kind: SourceObjectKind) -> Result<Vec<SourceObject>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare(
			"SELECT oid, kind, schema_name, object_name, restore_list_name, ordering_key, lifecycle, error
             FROM source_object WHERE kind = ?1 ORDER BY ordering_key DESC, oid ASC",
		)?;
		let rows = stmt.query_map(params![kind_tag(kind)], row_to_object)?;
		let mut out = Vec::new();
		for row in rows {
			let (mut object, kind_str, lifecycle_str) = row?;
			object.kind = parse_kind(&kind_str)?;
			object.lifecycle = parse_lifecycle(&lifecycle_str)?;
			out.push(object);
		}
		Ok(out)
	}

	pub fn mark_lifecycle(&self, kind: SourceObjectKind, oid: Oid, lifecycle: Lifecycle, error: Option<&str>) -> Result<()> {
		let conn = self.conn.lock();
		let updated = conn.execute(
			"UPDATE source_object SET lifecycle = ?1, error = ?2 WHERE kind = ?3 AND oid = ?4",
			params![lifecycle_tag(lifecycle), error, kind_tag(kind), oid.0],
		)?;
		if updated == 0 {
			return Err(Error::NotFound(format!("{kind_tag(kind)}:{}", oid.0)));
		}
		Ok(())
	}

	/// A single object by its variant and OID, or `None` if no row exists.
	pub fn get_source_object(&self, kind: SourceObjectKind, oid: Oid) -> Result<Option<SourceObject>> {
		let conn = self.conn.lock();
		let row = conn
			.query_row(
				"SELECT oid, kind, schema_name, object_name, restore_list_name, ordering_key, lifecycle, error
                 FROM source_object WHERE kind = ?1 AND oid = ?2",
				params![kind_tag(kind), oid.0],
				row_to_object,
			)
			.optional()?;
		match row {
			None => Ok(None),
			Some((mut object, kind_str, lifecycle_str)) => {
				object.kind = parse_kind(&kind_str)?;
				object.lifecycle = parse_lifecycle(&lifecycle_str)?;
				Ok(Some(object))
			}
		}
	}

	/// True once every row of `kind` belonging to `table_oid`-derived scope
	/// reaches `Done`. Used by the copy worker to decide whether to enqueue
	/// a table's indexes.
	pub fn all_partitions_done(&self, table_oid: Oid) -> Result<bool> {
		let conn = self.conn.lock();
		let remaining: i64 = conn.query_row(
			"SELECT COUNT(*) FROM table_partition WHERE table_oid = ?1 AND lifecycle != 'done'",
			params![table_oid.0],
			|row| row.get(0),
		)?;
		Ok(remaining == 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(oid: u32, ordering_key: i64) -> SourceObject {
		SourceObject {
			oid: Oid(oid),
			kind: SourceObjectKind::Table,
			qualified_name: QualifiedName::new("public", format!("t{oid}")),
			restore_list_name: format!("TABLE public t{oid}"),
			ordering_key,
			lifecycle: Lifecycle::Pending,
			error: None,
		}
	}

	#[test]
	fn list_is_ordered_by_ordering_key_descending() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_source_object(&sample(1, 10), false).unwrap();
		store.upsert_source_object(&sample(2, 100), false).unwrap();
		store.upsert_source_object(&sample(3, 50), false).unwrap();

		let listed = store.list_source_objects(SourceObjectKind::Table).unwrap();
		let oids: Vec<u32> = listed.iter().map(|o| o.oid.0).collect();
		assert_eq!(oids, vec![2, 3, 1]);
	}

	#[test]
	fn resume_preserves_done_rows() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_source_object(&sample(1, 10), false).unwrap();
		store.mark_lifecycle(SourceObjectKind::Table, Oid(1), Lifecycle::Done, None).unwrap();

		// A re-enumeration with preserve_done=true must not clobber the done row.
		let mut resubmitted = sample(1, 999);
		resubmitted.lifecycle = Lifecycle::Pending;
		store.upsert_source_object(&resubmitted, true).unwrap();

		let listed = store.list_source_objects(SourceObjectKind::Table).unwrap();
		assert_eq!(listed[0].lifecycle, Lifecycle::Done);
		assert_eq!(listed[0].ordering_key, 10);
	}

	#[test]
	fn non_resume_enumeration_overwrites_everything() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_source_object(&sample(1, 10), false).unwrap();
		store.mark_lifecycle(SourceObjectKind::Table, Oid(1), Lifecycle::Done, None).unwrap();

		store.upsert_source_object(&sample(1, 10), false).unwrap();
		let listed = store.list_source_objects(SourceObjectKind::Table).unwrap();
		assert_eq!(listed[0].lifecycle, Lifecycle::Pending);
	}

	#[test]
	fn get_source_object_finds_an_existing_row_and_misses_cleanly() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_source_object(&sample(1, 10), false).unwrap();

		assert_eq!(store.get_source_object(SourceObjectKind::Table, Oid(1)).unwrap(), Some(sample(1, 10)));
		assert!(store.get_source_object(SourceObjectKind::Table, Oid(404)).unwrap().is_none());
	}

	#[test]
	fn mark_lifecycle_on_missing_row_is_an_error() {
		let store = CatalogStore::open_in_memory().unwrap();
		let err = store.mark_lifecycle(SourceObjectKind::Table, Oid(404), Lifecycle::Done, None).unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}
}
