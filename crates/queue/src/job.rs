// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use pgferry_core::Oid;

/// One message carried by a work queue: a tag, an object identifier, and an
/// optional partition number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
	pub kind: JobKind,
	pub object: Oid,
	pub partition: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
	CopyTable,
	CopyLargeObject,
	CreateIndex,
}

impl Job {
	pub fn copy_table(oid: Oid, partition: u32) -> Self {
		Self { kind: JobKind::CopyTable, object: oid, partition: Some(partition) }
	}

	pub fn copy_large_object(oid: Oid) -> Self {
		Self { kind: JobKind::CopyLargeObject, object: oid, partition: None }
	}

	pub fn create_index(oid: Oid) -> Self {
		Self { kind: JobKind::CreateIndex, object: oid, partition: None }
	}
}
