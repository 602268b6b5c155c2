// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::ids::Oid;
use pgferry_core::model::{ConstraintDef, ConstraintKind};
use rusqlite::params;

use crate::error::{Error, Result};
use crate::store::CatalogStore;

fn kind_tag(kind: ConstraintKind) -> &'static str {
	match kind {
		ConstraintKind::Primary => "primary",
		ConstraintKind::Unique => "unique",
		ConstraintKind::Exclusion => "exclusion",
		ConstraintKind::ForeignKey => "foreign_key",
		ConstraintKind::Check => "check",
	}
}

fn parse_kind(tag: &str) -> Result<ConstraintKind> {
	Ok(match tag {
		"primary" => ConstraintKind::Primary,
		"unique" => ConstraintKind::Unique,
		"exclusion" => ConstraintKind::Exclusion,
		"foreign_key" => ConstraintKind::ForeignKey,
		"check" => ConstraintKind::Check,
		other => return Err(Error::Corrupt(format!("unknown constraint_def.kind {other:?}"))),
	})
}

impl CatalogStore {
	pub fn upsert_constraint(&self, constraint: &ConstraintDef) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"INSERT INTO constraint_def (oid, index_oid, name, kind, definition)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(oid) DO UPDATE SET
                index_oid = excluded.index_oid,
                name = excluded.name,
                kind = excluded.kind,
                definition = excluded.definition",
			params![constraint.oid.0, constraint.index_oid.0, constraint.name, kind_tag(constraint.kind), constraint.definition],
		)?;
		Ok(())
	}

	pub fn constraint_for_index(&self, index_oid: Oid) -> Result<Option<ConstraintDef>> {
		use rusqlite::OptionalExtension;
		let conn = self.conn.lock();
		let row = conn
			.query_row(
				"SELECT oid, name, kind, definition FROM constraint_def WHERE index_oid = ?1",
				params![index_oid.0],
				|row| {
					let oid: u32 = row.get(0)?;
					let name: String = row.get(1)?;
					let kind: String = row.get(2)?;
					let definition: String = row.get(3)?;
					Ok((oid, name, kind, definition))
				},
			)
			.optional()?;

		match row {
			None => Ok(None),
			Some((oid, name, kind, definition)) => Ok(Some(ConstraintDef {
				oid: Oid(oid),
				index_oid,
				name,
				kind: parse_kind(&kind)?,
				definition,
			})),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constraint_lookup_by_owning_index() {
		let store = CatalogStore::open_in_memory().unwrap();
		let constraint = ConstraintDef {
			oid: Oid(1),
			index_oid: Oid(99),
			name: "t_pkey".into(),
			kind: ConstraintKind::Primary,
			definition: "PRIMARY KEY (id)".into(),
		};
		store.upsert_constraint(&constraint).unwrap();

		let found = store.constraint_for_index(Oid(99)).unwrap().unwrap();
		assert_eq!(found, constraint);
		assert!(store.constraint_for_index(Oid(1)).unwrap().is_none());
	}
}
