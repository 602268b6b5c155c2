// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Statement files: the Transformer's output and the
//! Applier's input. Each line is either a control comment (`-- BEGIN
//! <xid>@<lsn>`, `-- COMMIT <xid>@<lsn>`, `-- KEEPALIVE <lsn>`, `-- SWITCH
//! <lsn>`, `-- ENDPOS <lsn>`, `-- ROLLBACK <xid>@<lsn>`) or a content-addressed
//! `PREPARE`/`EXECUTE` pair so the Applier can cache parsed plans across
//! statement files instead of re-preparing identical shapes every row.

use std::fmt::Write as _;

use pgferry_core::Lsn;
use xxhash_rust::xxh3::xxh3_64;

use crate::message::{ChangeKind, ColumnData, ColumnValue, RowChange};

/// One line of a statement file, already rendered to text.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementLine {
	Control(ControlMarker),
	Statement { prepare: String, hash: String, execute_values: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMarker {
	Begin { xid: u32, lsn: Lsn },
	Commit { xid: u32, lsn: Lsn },
	Rollback { xid: u32, lsn: Lsn },
	Keepalive { lsn: Lsn },
	Switch { lsn: Lsn },
	Endpos { lsn: Lsn },
}

impl ControlMarker {
	pub fn render(&self) -> String {
		match self {
			ControlMarker::Begin { xid, lsn } => format!("-- BEGIN {xid}@{lsn}"),
			ControlMarker::Commit { xid, lsn } => format!("-- COMMIT {xid}@{lsn}"),
			ControlMarker::Rollback { xid, lsn } => format!("-- ROLLBACK {xid}@{lsn}"),
			ControlMarker::Keepalive { lsn } => format!("-- KEEPALIVE {lsn}"),
			ControlMarker::Switch { lsn } => format!("-- SWITCH {lsn}"),
			ControlMarker::Endpos { lsn } => format!("-- ENDPOS {lsn}"),
		}
	}

	/// Parses one line rendered by [`Self::render`]. The inverse of
	/// `render`, used by the Applier to drive progress tracking off the
	/// statement file alone.
	pub fn parse(line: &str) -> crate::error::Result<ControlMarker> {
		let rest = line
			.strip_prefix("-- ")
			.ok_or_else(|| crate::error::Error::Decode(format!("not a control comment: {line:?}")))?;
		let (tag, payload) = rest
			.split_once(' ')
			.ok_or_else(|| crate::error::Error::Decode(format!("malformed control comment: {line:?}")))?;
		match tag {
			"BEGIN" | "COMMIT" | "ROLLBACK" => {
				let (xid_str, lsn_str) = payload
					.split_once('@')
					.ok_or_else(|| crate::error::Error::Decode(format!("malformed control comment: {line:?}")))?;
				let xid: u32 = xid_str
					.parse()
					.map_err(|_| crate::error::Error::Decode(format!("bad xid in control comment: {line:?}")))?;
				let lsn: Lsn = lsn_str.parse()?;
				Ok(match tag {
					"BEGIN" => ControlMarker::Begin { xid, lsn },
					"COMMIT" => ControlMarker::Commit { xid, lsn },
					"ROLLBACK" => ControlMarker::Rollback { xid, lsn },
					_ => unreachable!(),
				})
			}
			"KEEPALIVE" | "SWITCH" | "ENDPOS" => {
				let lsn: Lsn = payload.parse()?;
				Ok(match tag {
					"KEEPALIVE" => ControlMarker::Keepalive { lsn },
					"SWITCH" => ControlMarker::Switch { lsn },
					"ENDPOS" => ControlMarker::Endpos { lsn },
					_ => unreachable!(),
				})
			}
			other => Err(crate::error::Error::Decode(format!("unknown control marker tag {other:?}"))),
		}
	}
}

/// One parsed line of a statement file, as the Applier consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
	Control(ControlMarker),
	/// A `PREPARE <hash> AS ...;` line. `raw` is the exact line text, ready
	/// to execute verbatim.
	Prepare { hash: String, raw: String },
	/// An `EXECUTE <hash>(...);` line. `raw` is the exact line text.
	Execute { hash: String, raw: String },
}

/// Parses one non-empty line of a statement file. Blank
/// lines are the caller's concern to skip.
pub fn parse_line(line: &str) -> crate::error::Result<ParsedLine> {
	if let Some(rest) = line.strip_prefix("-- ") {
		let _ = rest;
		return Ok(ParsedLine::Control(ControlMarker::parse(line)?));
	}
	if let Some(rest) = line.strip_prefix("PREPARE ") {
		let hash = rest
			.split_once(' ')
			.map(|(hash, _)| hash)
			.ok_or_else(|| crate::error::Error::Decode(format!("malformed PREPARE line: {line:?}")))?;
		return Ok(ParsedLine::Prepare { hash: hash.to_string(), raw: line.to_string() });
	}
	if let Some(rest) = line.strip_prefix("EXECUTE ") {
		let hash = rest
			.split_once('(')
			.map(|(hash, _)| hash)
			.ok_or_else(|| crate::error::Error::Decode(format!("malformed EXECUTE line: {line:?}")))?;
		return Ok(ParsedLine::Execute { hash: hash.to_string(), raw: line.to_string() });
	}
	Err(crate::error::Error::Decode(format!("unrecognized statement file line: {line:?}")))
}

/// Double-quotes an identifier, doubling any embedded `"`.
pub fn quote_identifier(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 2);
	out.push('"');
	for c in name.chars() {
		if c == '"' {
			out.push('"');
		}
		out.push(c);
	}
	out.push('"');
	out
}

/// Renders one column value as a SQL literal, bit-exact with :
/// - `NULL` unquoted for [`ColumnData::Null`]
/// - standard single-quote string escaping (embedded `'` doubled) for text
/// - `\x`-prefixed hex for binary data
/// - `DEFAULT` for [`ColumnData::Unchanged`] columns, so the statement
///   leaves that column untouched rather than overwriting it with nothing
///   (this is the resolution to the TOAST-unchanged open question; see
///   [`ColumnData`] docs)
pub fn render_literal(data: &ColumnData) -> String {
	match data {
		ColumnData::Null => "NULL".to_string(),
		ColumnData::Text(s) => quote_string_literal(s),
		ColumnData::Binary(bytes) => format!("'\\x{}'", hex::encode(bytes)),
		ColumnData::Unchanged => "DEFAULT".to_string(),
	}
}

fn quote_string_literal(s: &str) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	out.push('\'');
	for c in s.chars() {
		if c == '\'' {
			out.push('\'');
		}
		out.push(c);
	}
	out.push('\'');
	out
}

/// Builds the content-addressed shape of a statement: the column/table
/// identifiers and placeholder count, but not the literal values. Two
/// changes to the same table with the same set of touched columns and the
/// same kind hash to the same shape, so the Applier can reuse one prepared
/// plan.
fn statement_shape(change: &RowChange) -> String {
	let mut shape = String::new();
	let _ = write!(shape, "{:?}|{}|{}|", change.kind, change.schema, change.table);
	for col in &change.columns {
		let _ = write!(shape, "{}:{},", col.name, col.type_name);
	}
	shape.push('|');
	for col in &change.old_columns {
		let _ = write!(shape, "{}:{},", col.name, col.type_name);
	}
	shape
}

/// Hashes a shape string to the hex digest used as the `PREPARE` statement
/// name, so identical shapes across rows and across statement files share
/// one cache entry.
pub fn shape_hash(change: &RowChange) -> String {
	format!("pgf_{:016x}", xxh3_64(statement_shape(change).as_bytes()))
}

/// Renders an INSERT/UPDATE/DELETE as a content-addressed PREPARE/EXECUTE
/// pair. The PREPARE body is parameterized with numbered placeholders, and
/// EXECUTE substitutes the actual literals, so the PREPARE line is reused
/// verbatim (the cache key) while EXECUTE carries row-specific data.
pub fn render_change(change: &RowChange) -> StatementLine {
	let hash = shape_hash(change);
	let qualified = format!("{}.{}", quote_identifier(&change.schema), quote_identifier(&change.table));

	let (prepare_body, placeholder_count) = match change.kind {
		ChangeKind::Insert => prepare_insert(&qualified, &change.columns),
		ChangeKind::Update => prepare_update(&qualified, &change.columns, &change.old_columns),
		ChangeKind::Delete => prepare_delete(&qualified, &change.old_columns),
	};
	let prepare = format!("PREPARE {hash} AS {prepare_body};");

	let mut values = Vec::with_capacity(placeholder_count);
	match change.kind {
		ChangeKind::Insert => {
			for col in &change.columns {
				values.push(render_literal(&col.data));
			}
		}
		ChangeKind::Update => {
			for col in &change.columns {
				if col.data == ColumnData::Unchanged {
					continue;
				}
				values.push(render_literal(&col.data));
			}
			for col in &change.old_columns {
				values.push(render_literal(&col.data));
			}
		}
		ChangeKind::Delete => {
			for col in &change.old_columns {
				values.push(render_literal(&col.data));
			}
		}
	}

	StatementLine::Statement { prepare, hash, execute_values: values }
}

fn prepare_insert(qualified: &str, columns: &[ColumnValue]) -> (String, usize) {
	let names: Vec<String> = columns.iter().map(|c| quote_identifier(&c.name)).collect();
	let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
	(format!("INSERT INTO {qualified} ({}) VALUES ({})", names.join(", "), placeholders.join(", ")), columns.len())
}

fn prepare_update(qualified: &str, columns: &[ColumnValue], old_columns: &[ColumnValue]) -> (String, usize) {
	let mut idx = 0;
	let sets: Vec<String> = columns
		.iter()
		.filter(|c| c.data != ColumnData::Unchanged)
		.map(|c| {
			idx += 1;
			format!("{} = ${idx}", quote_identifier(&c.name))
		})
		.collect();
	let where_clauses: Vec<String> = old_columns
		.iter()
		.map(|c| {
			idx += 1;
			format!("{} = ${idx}", quote_identifier(&c.name))
		})
		.collect();
	(format!("UPDATE {qualified} SET {} WHERE {}", sets.join(", "), where_clauses.join(" AND ")), idx)
}

fn prepare_delete(qualified: &str, old_columns: &[ColumnValue]) -> (String, usize) {
	let where_clauses: Vec<String> =
		old_columns.iter().enumerate().map(|(i, c)| format!("{} = ${}", quote_identifier(&c.name), i + 1)).collect();
	(format!("DELETE FROM {qualified} WHERE {}", where_clauses.join(" AND ")), old_columns.len())
}

impl StatementLine {
	/// Renders this line as it would appear in a statement file: one line
	/// for a control marker, or a `PREPARE ...; EXECUTE hash(...)` pair for
	/// a statement (the two are written as separate lines by the caller).
	pub fn render_lines(&self) -> Vec<String> {
		match self {
			StatementLine::Control(marker) => vec![marker.render()],
			StatementLine::Statement { prepare, hash, execute_values } => {
				vec![prepare.clone(), format!("EXECUTE {hash}({});", execute_values.join(", "))]
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn col(name: &str, ty: &str, data: ColumnData) -> ColumnValue {
		ColumnValue { name: name.to_string(), type_name: ty.to_string(), data }
	}

	#[test]
	fn quote_identifier_doubles_embedded_quotes() {
		assert_eq!(quote_identifier("plain"), "\"plain\"");
		assert_eq!(quote_identifier("weird\"name"), "\"weird\"\"name\"");
	}

	#[test]
	fn render_literal_covers_all_variants() {
		assert_eq!(render_literal(&ColumnData::Null), "NULL");
		assert_eq!(render_literal(&ColumnData::Text("it's".to_string())), "'it''s'");
		assert_eq!(render_literal(&ColumnData::Binary(vec![1, 2, 255])), "'\\x0102ff'");
		assert_eq!(render_literal(&ColumnData::Unchanged), "DEFAULT");
	}

	#[test]
	fn insert_prepares_numbered_placeholders_in_column_order() {
		let change = RowChange {
			schema: "public".into(),
			table: "category".into(),
			kind: ChangeKind::Insert,
			columns: vec![
				col("category_id", "int4", ColumnData::Text("1000".into())),
				col("name", "text", ColumnData::Text("Action".into())),
			],
			old_columns: Vec::new(),
		};
		let line = render_change(&change);
		match &line {
			StatementLine::Statement { prepare, execute_values, .. } => {
				assert!(prepare.contains(r#"INSERT INTO "public"."category" ("category_id", "name") VALUES ($1, $2)"#));
				assert_eq!(execute_values, &vec!["'1000'".to_string(), "'Action'".to_string()]);
			}
			_ => panic!("expected a statement line"),
		}
	}

	#[test]
	fn update_skips_unchanged_columns_in_the_set_clause() {
		let change = RowChange {
			schema: "public".into(),
			table: "t".into(),
			kind: ChangeKind::Update,
			columns: vec![
				col("a", "int4", ColumnData::Text("1".into())),
				col("big_blob", "text", ColumnData::Unchanged),
			],
			old_columns: vec![col("id", "int4", ColumnData::Text("7".into()))],
		};
		let line = render_change(&change);
		match &line {
			StatementLine::Statement { prepare, execute_values, .. } => {
				assert!(prepare.contains(r#"SET "a" = $1 WHERE "id" = $2"#));
				assert_eq!(execute_values, &vec!["'1'".to_string(), "'7'".to_string()]);
			}
			_ => panic!("expected a statement line"),
		}
	}

	#[test]
	fn delete_uses_only_old_columns() {
		let change = RowChange {
			schema: "public".into(),
			table: "t".into(),
			kind: ChangeKind::Delete,
			columns: Vec::new(),
			old_columns: vec![col("id", "int4", ColumnData::Text("7".into()))],
		};
		let line = render_change(&change);
		match &line {
			StatementLine::Statement { prepare, execute_values, .. } => {
				assert!(prepare.contains(r#"DELETE FROM "t" WHERE "id" = $1"#) || prepare.contains(r#""public"."t""#));
				assert_eq!(execute_values, &vec!["'7'".to_string()]);
			}
			_ => panic!("expected a statement line"),
		}
	}

	#[test]
	fn identical_shapes_hash_identically_across_different_row_values() {
		let a = RowChange {
			schema: "public".into(),
			table: "t".into(),
			kind: ChangeKind::Insert,
			columns: vec![col("id", "int4", ColumnData::Text("1".into()))],
			old_columns: Vec::new(),
		};
		let b = RowChange {
			schema: "public".into(),
			table: "t".into(),
			kind: ChangeKind::Insert,
			columns: vec![col("id", "int4", ColumnData::Text("2".into()))],
			old_columns: Vec::new(),
		};
		assert_eq!(shape_hash(&a), shape_hash(&b));
	}

	#[test]
	fn control_markers_render_as_sql_comments() {
		assert_eq!(
			ControlMarker::Begin { xid: 7, lsn: Lsn::new(100) }.render(),
			format!("-- BEGIN 7@{}", Lsn::new(100))
		);
		assert_eq!(ControlMarker::Switch { lsn: Lsn::new(5) }.render(), format!("-- SWITCH {}", Lsn::new(5)));
	}

	#[test]
	fn control_markers_round_trip_through_parse() {
		let markers = vec![
			ControlMarker::Begin { xid: 7, lsn: Lsn::new(100) },
			ControlMarker::Commit { xid: 7, lsn: Lsn::new(200) },
			ControlMarker::Rollback { xid: 9, lsn: Lsn::new(300) },
			ControlMarker::Keepalive { lsn: Lsn::new(400) },
			ControlMarker::Switch { lsn: Lsn::new(500) },
			ControlMarker::Endpos { lsn: Lsn::new(600) },
		];
		for marker in markers {
			let rendered = marker.render();
			assert_eq!(ControlMarker::parse(&rendered).unwrap(), marker);
		}
	}

	#[test]
	fn parse_line_classifies_control_prepare_and_execute_lines() {
		let change = RowChange {
			schema: "public".into(),
			table: "t".into(),
			kind: ChangeKind::Insert,
			columns: vec![col("id", "int4", ColumnData::Text("1".into()))],
			old_columns: Vec::new(),
		};
		let StatementLine::Statement { prepare, hash, .. } = render_change(&change) else {
			panic!("expected a statement line")
		};

		assert!(matches!(parse_line(&prepare).unwrap(), ParsedLine::Prepare { hash: h, .. } if h == hash));

		let execute_line = format!("EXECUTE {hash}('1');");
		assert!(matches!(parse_line(&execute_line).unwrap(), ParsedLine::Execute { hash: h, .. } if h == hash));

		let begin_line = ControlMarker::Begin { xid: 1, lsn: Lsn::new(1) }.render();
		assert!(matches!(parse_line(&begin_line).unwrap(), ParsedLine::Control(ControlMarker::Begin { .. })));
	}

	#[test]
	fn parse_line_rejects_garbage() {
		assert!(parse_line("not a statement line at all").is_err());
	}
}
