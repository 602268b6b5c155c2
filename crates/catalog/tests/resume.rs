// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! A cold resume after a partial run must not re-copy tables already
//! marked done, and must not lose the sentinel.

use pgferry_catalog::CatalogStore;
use pgferry_core::ids::QualifiedName;
use pgferry_core::model::{Lifecycle, SourceObject, SourceObjectKind};
use pgferry_core::Lsn;

fn table(oid: u32) -> SourceObject {
	SourceObject {
		oid: oid.into(),
		kind: SourceObjectKind::Table,
		qualified_name: QualifiedName::new("public", format!("t{oid}")),
		restore_list_name: format!("TABLE public t{oid}"),
		ordering_key: 1000 - oid as i64,
		lifecycle: Lifecycle::Pending,
		error: None,
	}
}

#[test]
fn cold_resume_preserves_finished_tables_and_sentinel_progress() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("source.db");

	{
		let store = CatalogStore::open(&path).unwrap();
		store.init_sentinel(Lsn::new(0)).unwrap();
		for oid in 0..8 {
			store.upsert_source_object(&table(oid), false).unwrap();
		}
		// Simulate 3 of 8 tables completing before a crash.
		for oid in 0..3 {
			store
				.mark_lifecycle(SourceObjectKind::Table, oid.into(), Lifecycle::Done, None)
				.unwrap();
		}
		store.set_write_flush(Lsn::new(1000), Lsn::new(900)).unwrap();
	}

	// Process "crashes" here; a fresh store handle reopens the same file
	// and re-enumerates with `preserve_done = true`.
	let store = CatalogStore::open(&path).unwrap();
	for oid in 0..8 {
		store.upsert_source_object(&table(oid), true).unwrap();
	}

	let objects = store.list_source_objects(SourceObjectKind::Table).unwrap();
	let done: Vec<u32> = objects.iter().filter(|o| o.lifecycle == Lifecycle::Done).map(|o| o.oid.0).collect();
	let pending: Vec<u32> = objects.iter().filter(|o| o.lifecycle == Lifecycle::Pending).map(|o| o.oid.0).collect();

	assert_eq!(done.len(), 3);
	assert_eq!(pending.len(), 5);
	assert_eq!(store.read_sentinel().unwrap().flush_lsn, Lsn::new(900));
}
