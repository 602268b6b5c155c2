// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! A tiny key-value table for singleton run state that doesn't warrant its
//! own table: the shared snapshot identifier the Snapshot Coordinator
//! distributes through the Catalog Store, and the Transformer/Applier's
//! resume bookmarks.

use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::store::CatalogStore;

const SHARED_SNAPSHOT_KEY: &str = "shared_snapshot_id";

impl CatalogStore {
	pub fn set_shared_snapshot(&self, snapshot_id: &str) -> Result<()> {
		self.set_run_state(SHARED_SNAPSHOT_KEY, snapshot_id)
	}

	pub fn get_shared_snapshot(&self) -> Result<Option<String>> {
		self.get_run_state(SHARED_SNAPSHOT_KEY)
	}

	pub fn set_run_state(&self, key: &str, value: &str) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute("INSERT OR REPLACE INTO run_state (key, value) VALUES (?1, ?2)", params![key, value])?;
		Ok(())
	}

	pub fn get_run_state(&self, key: &str) -> Result<Option<String>> {
		let conn = self.conn.lock();
		Ok(conn.query_row("SELECT value FROM run_state WHERE key = ?1", params![key], |row| row.get(0)).optional()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shared_snapshot_round_trips() {
		let store = CatalogStore::open_in_memory().unwrap();
		assert_eq!(store.get_shared_snapshot().unwrap(), None);
		store.set_shared_snapshot("00000003-1").unwrap();
		assert_eq!(store.get_shared_snapshot().unwrap().as_deref(), Some("00000003-1"));
	}
}
