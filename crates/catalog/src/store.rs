// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::Result;
use crate::schema;

/// The Catalog Store: one `rusqlite::Connection` guarded by a mutex (sqlite
/// connections are not `Sync`), matching the single-file embedded
/// store. Every write goes through a short-lived transaction.
pub struct CatalogStore {
	pub(crate) conn: Mutex<Connection>,
}

impl CatalogStore {
	/// Opens (creating if absent) the store at `path` and applies the
	/// schema. `path` is typically `<workdir>/schema/source.db`.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let conn = Connection::open(path)?;
		conn.pragma_update(None, "journal_mode", "WAL")?;
		conn.pragma_update(None, "foreign_keys", true)?;
		schema::migrate(&conn)?;
		Ok(Self { conn: Mutex::new(conn) })
	}

	/// An in-memory store, used by tests and by short-lived tooling that
	/// doesn't need to persist across process restarts.
	pub fn open_in_memory() -> Result<Self> {
		let conn = Connection::open_in_memory()?;
		schema::migrate(&conn)?;
		Ok(Self { conn: Mutex::new(conn) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opening_twice_does_not_lose_existing_rows() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("source.db");

		{
			let store = CatalogStore::open(&path).unwrap();
			store.register_process(1, "supervisor", 0).unwrap();
		}

		let store = CatalogStore::open(&path).unwrap();
		assert_eq!(store.list_processes().unwrap().len(), 1);
	}
}
