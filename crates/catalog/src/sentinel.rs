// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::Lsn;
use pgferry_core::model::Sentinel;
use rusqlite::{OptionalExtension, params};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::store::CatalogStore;

impl CatalogStore {
	/// Creates the singleton sentinel row if absent. A no-op if one already
	/// exists (so a resumed run keeps its prior sentinel state).
	pub fn init_sentinel(&self, startpos: Lsn) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"INSERT OR IGNORE INTO sentinel (id, startpos, endpos, write_lsn, flush_lsn, replay_lsn, apply)
             VALUES (0, ?1, NULL, ?1, ?1, ?1, 0)",
			params![startpos.to_string()],
		)?;
		Ok(())
	}

	pub fn read_sentinel(&self) -> Result<Sentinel> {
		let conn = self.conn.lock();
		let row = conn
			.query_row(
				"SELECT startpos, endpos, write_lsn, flush_lsn, replay_lsn, apply FROM sentinel WHERE id = 0",
				[],
				|row| {
					let startpos: String = row.get(0)?;
					let endpos: Option<String> = row.get(1)?;
					let write_lsn: String = row.get(2)?;
					let flush_lsn: String = row.get(3)?;
					let replay_lsn: String = row.get(4)?;
					let apply: i64 = row.get(5)?;
					Ok((startpos, endpos, write_lsn, flush_lsn, replay_lsn, apply))
				},
			)
			.optional()?;

		let (startpos, endpos, write_lsn, flush_lsn, replay_lsn, apply) =
			row.ok_or_else(|| Error::NotFound("sentinel".to_string()))?;

		let parse = |s: &str| -> Result<Lsn> { s.parse().map_err(pgferry_core::Error::from).map_err(Error::from) };

		Ok(Sentinel {
			startpos: parse(&startpos)?,
			endpos: endpos.map(|s| parse(&s)).transpose()?,
			write_lsn: parse(&write_lsn)?,
			flush_lsn: parse(&flush_lsn)?,
			replay_lsn: parse(&replay_lsn)?,
			apply: apply != 0,
		})
	}

	#[instrument(skip(self), level = "debug")]
	pub fn set_write_flush(&self, write_lsn: Lsn, flush_lsn: Lsn) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute(
			"UPDATE sentinel SET write_lsn = ?1, flush_lsn = ?2 WHERE id = 0",
			params![write_lsn.to_string(), flush_lsn.to_string()],
		)?;
		Ok(())
	}

	#[instrument(skip(self), level = "debug")]
	pub fn set_replay_lsn(&self, replay_lsn: Lsn) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute("UPDATE sentinel SET replay_lsn = ?1 WHERE id = 0", params![replay_lsn.to_string()])?;
		Ok(())
	}

	pub fn set_endpos(&self, endpos: Lsn) -> Result<()> {
		let conn = self.conn.lock();
		conn.execute("UPDATE sentinel SET endpos = ?1 WHERE id = 0", params![endpos.to_string()])?;
		Ok(())
	}

	/// `apply` may only flip false -> true (invariant); flipping
	/// it back down is rejected rather than silently ignored.
	pub fn set_apply(&self, apply: bool) -> Result<()> {
		let conn = self.conn.lock();
		if !apply {
			let current: i64 = conn.query_row("SELECT apply FROM sentinel WHERE id = 0", [], |row| row.get(0))?;
			if current != 0 {
				return Err(Error::Corrupt("sentinel.apply may only flip false -> true".to_string()));
			}
			return Ok(());
		}
		conn.execute("UPDATE sentinel SET apply = 1 WHERE id = 0", [])?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_sentinel_is_idempotent() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.init_sentinel(Lsn::new(0)).unwrap();
		store.set_replay_lsn(Lsn::new(500)).unwrap();
		store.init_sentinel(Lsn::new(0)).unwrap();

		assert_eq!(store.read_sentinel().unwrap().replay_lsn, Lsn::new(500));
	}

	#[test]
	fn apply_cannot_flip_back_to_false() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.init_sentinel(Lsn::new(0)).unwrap();
		store.set_apply(true).unwrap();
		assert!(store.set_apply(false).is_err());
		assert!(store.read_sentinel().unwrap().apply);
	}

	#[test]
	fn lsn_fields_round_trip_through_hex_text_form() {
		let store = CatalogStore::open_in_memory().unwrap();
		store.init_sentinel(Lsn::new(0x16_ABCDE0)).unwrap();
		store.set_write_flush(Lsn::new(0x20_000000), Lsn::new(0x18_000000)).unwrap();

		let sentinel = store.read_sentinel().unwrap();
		assert_eq!(sentinel.startpos, Lsn::new(0x16_ABCDE0));
		assert_eq!(sentinel.write_lsn, Lsn::new(0x20_000000));
		assert_eq!(sentinel.flush_lsn, Lsn::new(0x18_000000));
	}
}
