// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The ad-hoc table-of-contents parser: the external schema tool's
//! `--list` output is not exposed as a library, so this is a small
//! line-oriented pure-function parser over its text form, plus the
//! post-data filter-list logic built on top of it.
//!
//! A `--list` line looks like:
//! `3435; 1259 16390 CONSTRAINT public orders orders_pkey postgres`
//! dump-id; catalog-OID OID kind schema name owner — comment lines start
//! with `;`, and blank lines separate sections.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// One entry of the archive's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
	pub dump_id: u32,
	pub catalog_oid: u32,
	pub oid: u32,
	pub kind: String,
	pub schema: String,
	pub name: String,
	pub owner: String,
}

impl TocEntry {
	/// The identifying string the Catalog Store stores as
	/// `SourceObject::restore_list_name` for indexes and constraints
	/// (`"KIND schema name"`), so filtering can compare by plain string
	/// equality rather than re-deriving OIDs.
	pub fn restore_list_name(&self) -> String {
		format!("{} {} {}", self.kind, self.schema, self.name)
	}

	/// Renders this entry back to the `--list`/filter-file line form, byte
	/// for byte compatible with what the tool itself would emit, so a
	/// filter file built from parsed entries is accepted by `--use-list`.
	pub fn render(&self) -> String {
		format!("{}; {} {} {} {} {} {}", self.dump_id, self.catalog_oid, self.oid, self.kind, self.schema, self.name, self.owner)
	}
}

/// Parses the tool's `--list` output into entries, skipping comment
/// (`;`-prefixed) and blank lines.
pub fn parse_toc(list_output: &str) -> Vec<TocEntry> {
	list_output.lines().filter_map(|line| parse_toc_line(line.trim())).collect()
}

fn parse_toc_line(line: &str) -> Option<TocEntry> {
	if line.is_empty() || line.starts_with(';') {
		return None;
	}
	let (dump_id_str, rest) = line.split_once(';')?;
	let dump_id: u32 = dump_id_str.trim().parse().ok()?;
	let rest = rest.trim();

	let mut parts = rest.splitn(5, ' ');
	let catalog_oid: u32 = parts.next()?.parse().ok()?;
	let oid: u32 = parts.next()?.parse().ok()?;
	let kind = parts.next()?.to_string();
	let schema = parts.next()?.to_string();
	let tail = parts.next()?;
	let (name, owner) = tail.rsplit_once(' ')?;

	Some(TocEntry { dump_id, catalog_oid, oid, kind, schema, name: name.to_string(), owner: owner.to_string() })
}

/// Parses and validates every line strictly, for callers (tests, tooling)
/// that want a hard failure on a malformed archive listing rather than a
/// silent skip.
pub fn parse_toc_strict(list_output: &str) -> Result<Vec<TocEntry>> {
	let mut out = Vec::new();
	for line in list_output.lines() {
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with(';') {
			continue;
		}
		out.push(parse_toc_line(trimmed).ok_or_else(|| Error::MalformedTocLine(trimmed.to_string()))?);
	}
	Ok(out)
}

/// Builds the post-data filter list: every TOC entry whose
/// `restore_list_name()` is not in `already_created` (the primary-key and
/// unique indexes/constraints the copy engine already built directly).
/// Everything else — foreign keys, check constraints, triggers, rules —
/// passes through unfiltered.
pub fn build_post_data_filter(toc: &[TocEntry], already_created: &HashSet<String>) -> Vec<TocEntry> {
	toc.iter().filter(|entry| !already_created.contains(&entry.restore_list_name())).cloned().collect()
}

/// Renders a filter list to the text form `pg_restore --use-list` expects:
/// one entry per line, in TOC order.
pub fn render_filter_list(entries: &[TocEntry]) -> String {
	let mut out = String::new();
	for entry in entries {
		out.push_str(&entry.render());
		out.push('\n');
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE_LISTING: &str = "\
;
; Archive created at 2026-01-01 00:00:00 UTC
;     dbname: source
;     TOC Entries: 4
;
;
; Selected TOC Entries:
;
3433; 1259 16386 TABLE public orders postgres
3434; 2606 16390 CONSTRAINT public orders orders_pkey postgres
3435; 2606 16392 FK CONSTRAINT public orders orders_customer_fk postgres
3436; 1259 16400 INDEX public orders orders_created_at_idx postgres
";

	#[test]
	fn parses_entries_and_skips_comments_and_blanks() {
		let entries = parse_toc(SAMPLE_LISTING);
		assert_eq!(entries.len(), 4);
		assert_eq!(
			entries[0],
			TocEntry {
				dump_id: 3433,
				catalog_oid: 1259,
				oid: 16386,
				kind: "TABLE".into(),
				schema: "public".into(),
				name: "orders".into(),
				owner: "postgres".into(),
			}
		);
	}

	#[test]
	fn restore_list_name_matches_the_catalog_convention() {
		let entries = parse_toc(SAMPLE_LISTING);
		assert_eq!(entries[1].restore_list_name(), "CONSTRAINT public orders_pkey");
	}

	#[test]
	fn render_round_trips_through_parse() {
		let entries = parse_toc(SAMPLE_LISTING);
		for entry in &entries {
			let rendered = entry.render();
			let reparsed = parse_toc(&rendered);
			assert_eq!(reparsed, vec![entry.clone()]);
		}
	}

	#[test]
	fn post_data_filter_drops_already_created_indexes_and_constraints() {
		let entries = parse_toc(SAMPLE_LISTING);
		let mut already_created = HashSet::new();
		already_created.insert("CONSTRAINT public orders_pkey".to_string());

		let filtered = build_post_data_filter(&entries, &already_created);
		let names: Vec<&str> = filtered.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, vec!["orders", "orders_customer_fk", "orders_created_at_idx"]);
	}

	#[test]
	fn strict_parse_rejects_a_malformed_line() {
		assert!(parse_toc_strict("not a toc line").is_err());
		assert!(parse_toc_strict(SAMPLE_LISTING).is_ok());
	}
}
