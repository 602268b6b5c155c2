// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The entities of the data model: source objects, partitions,
//! index/constraint definitions, the sentinel, and the process registry.
//! These are plain data types; the catalog crate is the only thing that
//! persists and mutates them.

use serde::{Deserialize, Serialize};

use crate::ids::{Oid, QualifiedName};
use crate::lsn::Lsn;

/// Lifecycle of a [`SourceObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
	Pending,
	InProgress,
	Done,
	Skipped,
	Failed,
}

/// Tagged variant discriminator for a [`SourceObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceObjectKind {
	Table,
	PartitionOfTable,
	Index,
	Constraint,
	Sequence,
	LargeObject,
	Extension,
	Collation,
	DependEdge,
}

/// One row of the Catalog Store's object table. `ordering_key` is the
/// estimated-row-count (tables) or parent-table ordering key (indexes),
/// used to decide queue seeding order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceObject {
	pub oid: Oid,
	pub kind: SourceObjectKind,
	pub qualified_name: QualifiedName,
	pub restore_list_name: String,
	pub ordering_key: i64,
	pub lifecycle: Lifecycle,
	pub error: Option<String>,
}

/// A non-overlapping, table-covering slice assigned to one copy worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePartition {
	pub table_oid: Oid,
	pub part_number: u32,
	pub total_parts: u32,
	pub predicate: PartitionPredicate,
	pub lifecycle: Lifecycle,
}

impl TablePartition {
	/// Exactly one partition per table truncates before copying, and it is
	/// always the first one to start (part number zero by construction).
	pub fn is_truncating_partition(&self) -> bool {
		self.part_number == 0
	}
}

/// How a table is sliced across partitions. `Single` covers the whole table
/// with no predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionPredicate {
	Single,
	IntRange { column: String, lower_inclusive: Option<i64>, upper_exclusive: Option<i64> },
	PhysicalRange { lower_inclusive: Option<(u32, u16)>, upper_exclusive: Option<(u32, u16)> },
}

impl PartitionPredicate {
	/// Render as a SQL `WHERE` clause fragment (without the `WHERE`
	/// keyword), or `None` when the partition covers the whole table.
	pub fn where_clause(&self) -> Option<String> {
		match self {
			PartitionPredicate::Single => None,
			PartitionPredicate::IntRange { column, lower_inclusive, upper_exclusive } => {
				let quoted = crate::ids::quote_ident(column);
				let mut parts = Vec::new();
				if let Some(lower) = lower_inclusive {
					parts.push(format!("{quoted} >= {lower}"));
				}
				if let Some(upper) = upper_exclusive {
					parts.push(format!("{quoted} < {upper}"));
				}
				if parts.is_empty() { None } else { Some(parts.join(" AND ")) }
			}
			PartitionPredicate::PhysicalRange { lower_inclusive, upper_exclusive } => {
				let mut parts = Vec::new();
				if let Some((block, tuple)) = lower_inclusive {
					parts.push(format!("ctid >= '({block},{tuple})'::tid"));
				}
				if let Some((block, tuple)) = upper_exclusive {
					parts.push(format!("ctid < '({block},{tuple})'::tid"));
				}
				if parts.is_empty() { None } else { Some(parts.join(" AND ")) }
			}
		}
	}
}

/// Belongs to exactly one table (or one partition in same-table mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
	pub oid: Oid,
	pub table_oid: Oid,
	pub name: String,
	pub create_statement: String,
	pub backs_constraint: Option<Oid>,
	pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
	Primary,
	Unique,
	Exclusion,
	ForeignKey,
	Check,
}

/// Belongs to exactly one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
	pub oid: Oid,
	pub index_oid: Oid,
	pub name: String,
	pub kind: ConstraintKind,
	pub definition: String,
}

/// The singleton coordination row shared between the copy phase and the CDC
/// pipeline. Invariant: `replay_lsn <= flush_lsn <= write_lsn`; `endpos`, if
/// set, is `>= startpos`; `apply` may only flip false -> true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinel {
	pub startpos: Lsn,
	pub endpos: Option<Lsn>,
	pub write_lsn: Lsn,
	pub flush_lsn: Lsn,
	pub replay_lsn: Lsn,
	pub apply: bool,
}

impl Sentinel {
	pub fn new(startpos: Lsn) -> Self {
		Self {
			startpos,
			endpos: None,
			write_lsn: startpos,
			flush_lsn: startpos,
			replay_lsn: startpos,
			apply: false,
		}
	}

	/// Whether `lsn` is at or past the configured stop point.
	pub fn reached_endpos(&self, lsn: Lsn) -> bool {
		self.endpos.is_some_and(|endpos| lsn >= endpos)
	}

	pub fn invariant_holds(&self) -> bool {
		let ordered = self.replay_lsn <= self.flush_lsn && self.flush_lsn <= self.write_lsn;
		let endpos_ok = self.endpos.is_none_or(|e| e >= self.startpos);
		ordered && endpos_ok
	}
}

/// {pid, role, start-time}. One row per live pid; workers register on start
/// and unregister on exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRow {
	pub pid: u32,
	pub role: String,
	pub start_time_unix: i64,
}

/// A content-addressed prepared-statement cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementEntry {
	pub hash: String,
	pub sql_with_placeholders: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sentinel_invariant_detects_out_of_order_lsns() {
		let mut s = Sentinel::new(Lsn::new(0));
		assert!(s.invariant_holds());
		s.flush_lsn = Lsn::new(10);
		s.write_lsn = Lsn::new(5);
		assert!(!s.invariant_holds());
	}

	#[test]
	fn sentinel_endpos_must_not_precede_startpos() {
		let mut s = Sentinel::new(Lsn::new(100));
		s.endpos = Some(Lsn::new(50));
		assert!(!s.invariant_holds());
		s.endpos = Some(Lsn::new(150));
		assert!(s.invariant_holds());
	}

	#[test]
	fn reached_endpos_is_inclusive() {
		let mut s = Sentinel::new(Lsn::new(0));
		s.endpos = Some(Lsn::new(100));
		assert!(!s.reached_endpos(Lsn::new(99)));
		assert!(s.reached_endpos(Lsn::new(100)));
		assert!(s.reached_endpos(Lsn::new(101)));
	}

	#[test]
	fn int_range_predicate_renders_both_bounds() {
		let p = PartitionPredicate::IntRange {
			column: "id".into(),
			lower_inclusive: Some(0),
			upper_exclusive: Some(1000),
		};
		assert_eq!(p.where_clause().unwrap(), "\"id\" >= 0 AND \"id\" < 1000");
	}

	#[test]
	fn single_predicate_has_no_where_clause() {
		assert!(PartitionPredicate::Single.where_clause().is_none());
	}

	#[test]
	fn first_partition_is_the_truncating_one() {
		let part = TablePartition {
			table_oid: Oid(1),
			part_number: 0,
			total_parts: 3,
			predicate: PartitionPredicate::Single,
			lifecycle: Lifecycle::Pending,
		};
		assert!(part.is_truncating_partition());
		let mut other = part.clone();
		other.part_number = 1;
		assert!(!other.is_truncating_partition());
	}
}
