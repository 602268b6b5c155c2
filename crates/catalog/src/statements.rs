// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The content-addressed statement cache. Keyed by a short stable hash of
//! a statement's shape so a resumed transformer run reconstructs the same
//! hashes the original run used.

use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::store::CatalogStore;

impl CatalogStore {
	/// Inserts the statement if its hash is unseen; returns whether it was
	/// newly inserted (the transformer only emits a `PREPARE` line the
	/// first time).
	pub fn intern_statement(&self, hash: &str, sql_with_placeholders: &str) -> Result<bool> {
		let conn = self.conn.lock();
		let inserted = conn.execute(
			"INSERT OR IGNORE INTO statement_entry (hash, sql_with_placeholders) VALUES (?1, ?2)",
			params![hash, sql_with_placeholders],
		)?;
		Ok(inserted == 1)
	}

	pub fn lookup_statement(&self, hash: &str) -> Result<Option<String>> {
		let conn = self.conn.lock();
		Ok(conn
			.query_row("SELECT sql_with_placeholders FROM statement_entry WHERE hash = ?1", params![hash], |row| {
				row.get(0)
			})
			.optional()?)
	}

	pub fn known_statement_hashes(&self) -> Result<Vec<String>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare("SELECT hash FROM statement_entry")?;
		let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
		Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interning_the_same_hash_twice_only_reports_new_once() {
		let store = CatalogStore::open_in_memory().unwrap();
		assert!(store.intern_statement("h1", "INSERT INTO t VALUES ($1)").unwrap());
		assert!(!store.intern_statement("h1", "INSERT INTO t VALUES ($1)").unwrap());
	}

	#[test]
	fn lookup_returns_the_cached_sql() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.intern_statement("h1", "INSERT INTO t VALUES ($1)").unwrap();
		assert_eq!(store.lookup_statement("h1").unwrap().as_deref(), Some("INSERT INTO t VALUES ($1)"));
		assert!(store.lookup_statement("missing").unwrap().is_none());
	}
}
