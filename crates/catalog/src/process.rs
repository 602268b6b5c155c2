// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::model::ProcessRow;
use rusqlite::params;

use crate::error::Result;
use crate::store::CatalogStore;

impl CatalogStore {
	pub fn register_process(&self, pid: u32, role: &str, start_time_unix: i64) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"INSERT OR REPLACE INTO process_row (pid, role, start_time_unix) VALUES (?1, ?2, ?3)",
			params![pid, role, start_time_unix],
		)?;
		Ok(())
	}

	pub fn unregister_process(&self, pid: u32) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute("DELETE FROM process_row WHERE pid = ?1", params![pid])?;
		Ok(())
	}

	pub fn list_processes(&self) -> Result<Vec<ProcessRow>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare("SELECT pid, role, start_time_unix FROM process_row ORDER BY pid ASC")?;
		let rows = stmt.query_map([], |row| {
			Ok(ProcessRow { pid: row.get(0)?, role: row.get(1)?, start_time_unix: row.get(2)? })
		})?;
		Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn register_then_unregister_leaves_no_row() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.register_process(42, "table-copy-worker", 1_700_000_000).unwrap();
		assert_eq!(store.list_processes().unwrap().len(), 1);

		store.unregister_process(42).unwrap();
		assert_eq!(store.list_processes().unwrap().len(), 0);
	}

	#[test]
	fn re_registering_same_pid_replaces_the_row() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.register_process(1, "supervisor", 10).unwrap();
		store.register_process(1, "supervisor", 20).unwrap();
		let rows = store.list_processes().unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].start_time_unix, 20);
	}
}
