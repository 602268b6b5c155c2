// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The dependency edge list, used later to filter the post-data archive
//! down to objects this run hasn't already created during the
//! filtered restore step.

use pgferry_core::ids::Oid;
use rusqlite::params;

use crate::error::Result;
use crate::store::CatalogStore;

impl CatalogStore {
	pub fn upsert_dependency_edge(&self, from_oid: Oid, to_oid: Oid) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"INSERT OR IGNORE INTO dependency_edge (from_oid, to_oid) VALUES (?1, ?2)",
			params![from_oid.0, to_oid.0],
		)?;
		Ok(())
	}

	/// The OIDs that `oid` directly depends on.
	pub fn dependencies_of(&self, oid: Oid) -> Result<Vec<Oid>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare("SELECT to_oid FROM dependency_edge WHERE from_oid = ?1 ORDER BY to_oid ASC")?;
		let rows = stmt.query_map(params![oid.0], |row| row.get::<_, u32>(0))?;
		Ok(rows.collect::<rusqlite::Result<Vec<u32>>>()?.into_iter().map(Oid).collect())
	}

	pub fn all_dependency_edges(&self) -> Result<Vec<(Oid, Oid)>> {
		let conn = self.conn.lock();
		let mut stmt = conn.prepare("SELECT from_oid, to_oid FROM dependency_edge ORDER BY from_oid ASC, to_oid ASC")?;
		let rows = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)))?;
		Ok(rows.collect::<rusqlite::Result<Vec<(u32, u32)>>>()?.into_iter().map(|(a, b)| (Oid(a), Oid(b))).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dependency_edges_are_deduplicated_and_ordered() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.upsert_dependency_edge(Oid(1), Oid(2)).unwrap();
		store.upsert_dependency_edge(Oid(1), Oid(3)).unwrap();
		store.upsert_dependency_edge(Oid(1), Oid(2)).unwrap();

		assert_eq!(store.dependencies_of(Oid(1)).unwrap(), vec![Oid(2), Oid(3)]);
		assert_eq!(store.all_dependency_edges().unwrap().len(), 2);
	}
}
