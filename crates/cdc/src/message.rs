// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The decoded message model requires every decoder dialect to
//! produce: `{BEGIN, CHANGE, COMMIT, KEEPALIVE, SWITCH-WAL}`.

use pgferry_core::Lsn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	Begin { xid: u32, lsn: Lsn },
	Change { xid: u32, lsn: Lsn, change: RowChange },
	Commit { xid: u32, lsn: Lsn },
	Keepalive { lsn: Lsn },
	/// Emitted by the receiver itself when the stream crosses a WAL
	/// boundary, never by a decoder plugin.
	Switch { lsn: Lsn },
}

impl Message {
	pub fn lsn(&self) -> Lsn {
		match self {
			Message::Begin { lsn, .. }
			| Message::Change { lsn, .. }
			| Message::Commit { lsn, .. }
			| Message::Keepalive { lsn }
			| Message::Switch { lsn } => *lsn,
		}
	}

	pub fn xid(&self) -> Option<u32> {
		match self {
			Message::Begin { xid, .. } | Message::Change { xid, .. } | Message::Commit { xid, .. } => Some(*xid),
			Message::Keepalive { .. } | Message::Switch { .. } => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
	Insert,
	Update,
	Delete,
}

/// One decoded row change. `old_columns` carries the before-image: the full
/// old row under `REPLICA IDENTITY FULL`, or just the key columns
/// otherwise; empty for inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
	pub schema: String,
	pub table: String,
	pub kind: ChangeKind,
	pub columns: Vec<ColumnValue>,
	pub old_columns: Vec<ColumnValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValue {
	pub name: String,
	pub type_name: String,
	pub data: ColumnData,
}

/// The value a decoded column carries. `Unchanged` covers a decoder plugin
/// reporting an unchanged TOAST value for a `REPLICA IDENTITY FULL`
/// UPDATE; the transformer's resolution is to skip emitting that column
/// entirely, relying on the before-image for the `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
	Null,
	Text(String),
	Binary(Vec<u8>),
	Unchanged,
}
