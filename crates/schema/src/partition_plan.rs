// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The partitioning decision, factored out as a pure function so it can
//! be unit tested without a database connection.

use pgferry_core::model::PartitionPredicate;

/// A single-column not-null unique integer key, with the min/max values
/// observed on the source under the shared snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntKeyRange<'a> {
	pub column: &'a str,
	pub min_value: i64,
	pub max_value: i64,
}

/// The source's estimate of the table's physical page count, used for the
/// `ctid`-based fallback split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalExtent {
	pub relpages: u32,
}

/// Decides how a table is sliced into partitions:
///
/// 1. If `estimated_bytes` exceeds `threshold_bytes` and a not-null unique
///    single-column integer key is known, emit `K` integer-range partitions
///    where `K = min(max_parts, ceil(estimated_bytes / threshold_bytes))`.
/// 2. Else, if `same_table_concurrency` is enabled and a physical extent is
///    known, emit `K` `ctid`-based physical-range partitions.
/// 3. Else, one partition covering the whole table.
pub fn plan_partitions(
	estimated_bytes: u64,
	threshold_bytes: u64,
	max_parts: u32,
	int_key: Option<IntKeyRange<'_>>,
	physical: Option<PhysicalExtent>,
	same_table_concurrency: bool,
) -> Vec<PartitionPredicate> {
	if threshold_bytes == 0 || estimated_bytes <= threshold_bytes || max_parts <= 1 {
		return vec![PartitionPredicate::Single];
	}

	let wanted = estimated_bytes.div_ceil(threshold_bytes).min(max_parts as u64).max(1) as u32;
	if wanted <= 1 {
		return vec![PartitionPredicate::Single];
	}

	if let Some(key) = int_key {
		return int_range_partitions(key, wanted);
	}
	if same_table_concurrency {
		if let Some(extent) = physical {
			return physical_range_partitions(extent, wanted);
		}
	}
	vec![PartitionPredicate::Single]
}

/// Splits `[min_value, max_value]` into `parts` contiguous, non-overlapping
/// buckets. The first partition's lower bound and the last partition's
/// upper bound are left open (`None`) so the union covers every value a
/// concurrent writer might still insert outside the snapshot's observed
/// range, preserving the "covers the table with no overlap" invariant.
fn int_range_partitions(key: IntKeyRange<'_>, parts: u32) -> Vec<PartitionPredicate> {
	let span = key.max_value.saturating_sub(key.min_value).saturating_add(1).max(1) as u64;
	let width = span.div_ceil(parts as u64).max(1) as i64;

	let mut out = Vec::with_capacity(parts as usize);
	let mut lower = key.min_value;
	for i in 0..parts {
		let is_last = i == parts - 1;
		out.push(PartitionPredicate::IntRange {
			column: key.column.to_string(),
			lower_inclusive: if i == 0 { None } else { Some(lower) },
			upper_exclusive: if is_last { None } else { Some(lower + width) },
		});
		lower += width;
	}
	out
}

/// Splits the table's block range `[0, relpages)` into `parts` contiguous
/// `ctid` ranges, open at both ends for the same reason as
/// [`int_range_partitions`].
fn physical_range_partitions(extent: PhysicalExtent, parts: u32) -> Vec<PartitionPredicate> {
	let blocks_per_part = (extent.relpages as u64).div_ceil(parts as u64).max(1) as u32;

	let mut out = Vec::with_capacity(parts as usize);
	let mut lower_block = 0u32;
	for i in 0..parts {
		let is_last = i == parts - 1;
		out.push(PartitionPredicate::PhysicalRange {
			lower_inclusive: if i == 0 { None } else { Some((lower_block, 0)) },
			upper_exclusive: if is_last { None } else { Some((lower_block + blocks_per_part, 0)) },
		});
		lower_block += blocks_per_part;
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn small_table_is_never_split() {
		let plan = plan_partitions(1000, 200_000, 4, None, None, true);
		assert_eq!(plan, vec![PartitionPredicate::Single]);
	}

	#[test]
	fn rental_scenario_yields_at_least_two_partitions() {
		// scenario 2: 16000-row table, 200kB threshold.
		let estimated_bytes = 16_000 * 200; // ~3.2MB, well past 200kB
		let key = IntKeyRange { column: "rental_id", min_value: 1, max_value: 16_000 };
		let plan = plan_partitions(estimated_bytes, 200_000, 8, Some(key), None, false);
		assert!(plan.len() >= 2, "expected at least 2 partitions, got {}", plan.len());
		assert!(matches!(plan[0], PartitionPredicate::IntRange { .. }));
	}

	#[test]
	fn part_count_is_capped_by_max_parts() {
		let key = IntKeyRange { column: "id", min_value: 0, max_value: 1_000_000 };
		let plan = plan_partitions(100 * 1024 * 1024, 1024, 4, Some(key), None, false);
		assert_eq!(plan.len(), 4);
	}

	#[test]
	fn int_range_partitions_cover_the_whole_domain_with_no_overlap() {
		let key = IntKeyRange { column: "id", min_value: 1, max_value: 97 };
		let plan = plan_partitions(1_000_000, 10_000, 5, Some(key), None, false);

		let mut bounds = Vec::new();
		for p in &plan {
			if let PartitionPredicate::IntRange { lower_inclusive, upper_exclusive, .. } = p {
				bounds.push((*lower_inclusive, *upper_exclusive));
			} else {
				panic!("expected IntRange predicate");
			}
		}
		assert_eq!(bounds.first().unwrap().0, None);
		assert_eq!(bounds.last().unwrap().1, None);
		for w in bounds.windows(2) {
			assert_eq!(w[0].1, w[1].0, "adjacent partitions must share their boundary with no gap");
		}
	}

	#[test]
	fn falls_back_to_physical_range_when_no_int_key_and_concurrency_enabled() {
		let extent = PhysicalExtent { relpages: 4096 };
		let plan = plan_partitions(1024 * 1024 * 1024, 1024, 3, None, Some(extent), true);
		assert_eq!(plan.len(), 3);
		assert!(matches!(plan[0], PartitionPredicate::PhysicalRange { .. }));
	}

	#[test]
	fn falls_back_to_single_when_no_key_and_concurrency_disabled() {
		let extent = PhysicalExtent { relpages: 4096 };
		let plan = plan_partitions(1024 * 1024 * 1024, 1024, 3, None, Some(extent), false);
		assert_eq!(plan, vec![PartitionPredicate::Single]);
	}
}
