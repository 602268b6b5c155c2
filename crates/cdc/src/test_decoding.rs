// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The text decoder dialect: matches the common
//! `test_decoding` output shape, `BEGIN <xid>` / `COMMIT <xid>` / `table
//! "schema"."table": INSERT: col[type]:value …`.

use pgferry_core::Lsn;

use crate::decoder::DecoderPlugin;
use crate::error::{Error, Result};
use crate::message::{ChangeKind, ColumnData, ColumnValue, Message, RowChange};

pub struct TestDecoding;

impl DecoderPlugin for TestDecoding {
	fn name(&self) -> &'static str {
		"test_decoding"
	}

	fn decode(&self, raw: &[u8], lsn: Lsn) -> Result<Message> {
		let text = std::str::from_utf8(raw).map_err(|e| Error::Decode(e.to_string()))?.trim();

		if let Some(rest) = text.strip_prefix("BEGIN ") {
			let xid = parse_xid(rest)?;
			return Ok(Message::Begin { xid, lsn });
		}
		if let Some(rest) = text.strip_prefix("COMMIT ") {
			let xid = parse_xid(rest)?;
			return Ok(Message::Commit { xid, lsn });
		}
		if let Some(rest) = text.strip_prefix("table ") {
			return parse_change(rest, lsn);
		}
		Err(Error::Decode(format!("unrecognized test_decoding line: {text:?}")))
	}
}

fn parse_xid(rest: &str) -> Result<u32> {
	rest.trim().parse().map_err(|_| Error::Decode(format!("bad xid in {rest:?}")))
}

/// Parses `"schema"."table": INSERT: col[type]:value col2[type]:value …`.
fn parse_change(rest: &str, lsn: Lsn) -> Result<Message> {
	let (qualified, tail) = rest.split_once(':').ok_or_else(|| Error::Decode(format!("malformed change line: {rest:?}")))?;
	let (schema, table) = parse_qualified_name(qualified.trim())?;

	let tail = tail.trim();
	let (kind_str, columns_str) =
		tail.split_once(':').ok_or_else(|| Error::Decode(format!("malformed change kind: {tail:?}")))?;
	let kind = match kind_str.trim() {
		"INSERT" => ChangeKind::Insert,
		"UPDATE" => ChangeKind::Update,
		"DELETE" => ChangeKind::Delete,
		other => return Err(Error::Decode(format!("unknown change kind {other:?}"))),
	};

	let columns = parse_columns(columns_str.trim())?;
	// test_decoding has no separate before-image section in this grammar;
	// callers relying on old-row data for `REPLICA IDENTITY FULL` should
	// prefer the wal2json dialect, which carries an explicit `identity`
	// array.
	Ok(Message::Change {
		xid: 0,
		lsn,
		change: RowChange { schema, table, kind, columns, old_columns: Vec::new() },
	})
}

fn parse_qualified_name(s: &str) -> Result<(String, String)> {
	let parts: Vec<&str> = s.splitn(2, '.').collect();
	if parts.len() != 2 {
		return Err(Error::Decode(format!("expected schema.table, got {s:?}")));
	}
	let unquote = |p: &str| p.trim_matches('"').to_string();
	Ok((unquote(parts[0]), unquote(parts[1])))
}

/// Parses a sequence of `name[type]:value` tokens, where `value` is either
/// an unquoted literal (`null`, a number) or a single-quoted string with
/// embedded quotes doubled, matching the server's own `quote_literal`
/// output.
fn parse_columns(s: &str) -> Result<Vec<ColumnValue>> {
	let mut out = Vec::new();
	let mut rest = s;
	while !rest.is_empty() {
		let bracket_open = rest.find('[').ok_or_else(|| Error::Decode(format!("missing '[' in {rest:?}")))?;
		let name = rest[..bracket_open].trim().to_string();
		let bracket_close =
			rest[bracket_open..].find(']').ok_or_else(|| Error::Decode(format!("missing ']' in {rest:?}")))?
				+ bracket_open;
		let type_name = rest[bracket_open + 1..bracket_close].to_string();

		let after_type = &rest[bracket_close + 1..];
		let after_colon = after_type.strip_prefix(':').ok_or_else(|| Error::Decode(format!("missing ':' in {after_type:?}")))?;

		let (value_str, remainder) = take_one_value(after_colon)?;
		out.push(ColumnValue { name, type_name, data: parse_value(&value_str) });
		rest = remainder.trim_start();
	}
	Ok(out)
}

/// Splits off one value token, respecting single-quoted strings with
/// doubled-quote escaping, so an embedded space or bracket inside a quoted
/// literal doesn't get mistaken for the next column's boundary.
fn take_one_value(s: &str) -> Result<(String, &str)> {
	let s = s.trim_start();
	if let Some(rest) = s.strip_prefix('\'') {
		let mut chars = rest.char_indices().peekable();
		let mut out = String::new();
		while let Some((i, c)) = chars.next() {
			if c == '\'' {
				if rest[i + 1..].starts_with('\'') {
					out.push('\'');
					chars.next();
					continue;
				}
				return Ok((format!("'{out}'"), &rest[i + 1..]));
			}
			out.push(c);
		}
		Err(Error::Decode("unterminated quoted literal".into()))
	} else {
		let end = s.find(' ').unwrap_or(s.len());
		Ok((s[..end].to_string(), &s[end..]))
	}
}

fn parse_value(token: &str) -> ColumnData {
	if token == "null" {
		return ColumnData::Null;
	}
	if let Some(inner) = token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
		return ColumnData::Text(inner.replace("''", "'"));
	}
	ColumnData::Text(token.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_begin_and_commit_lines() {
		let decoder = TestDecoding;
		assert_eq!(decoder.decode(b"BEGIN 501", Lsn::new(1)).unwrap(), Message::Begin { xid: 501, lsn: Lsn::new(1) });
		assert_eq!(decoder.decode(b"COMMIT 501", Lsn::new(2)).unwrap(), Message::Commit { xid: 501, lsn: Lsn::new(2) });
	}

	#[test]
	fn decodes_an_insert_line_with_two_columns() {
		let decoder = TestDecoding;
		let line = r#"table "public"."category": INSERT: category_id[int4]:1000 name[text]:'Action'"#;
		let msg = decoder.decode(line.as_bytes(), Lsn::new(10)).unwrap();
		match msg {
			Message::Change { change, .. } => {
				assert_eq!(change.schema, "public");
				assert_eq!(change.table, "category");
				assert_eq!(change.kind, ChangeKind::Insert);
				assert_eq!(change.columns.len(), 2);
				assert_eq!(change.columns[0].data, ColumnData::Text("1000".to_string()));
				assert_eq!(change.columns[1].data, ColumnData::Text("Action".to_string()));
			}
			_ => panic!("expected a Change message"),
		}
	}

	#[test]
	fn decodes_embedded_quotes_inside_a_string_literal() {
		let decoder = TestDecoding;
		let line = r#"table "public"."t": UPDATE: name[text]:'O''Brien'"#;
		let msg = decoder.decode(line.as_bytes(), Lsn::new(1)).unwrap();
		match msg {
			Message::Change { change, .. } => {
				assert_eq!(change.columns[0].data, ColumnData::Text("O'Brien".to_string()));
			}
			_ => panic!("expected a Change message"),
		}
	}

	#[test]
	fn null_value_decodes_to_column_data_null() {
		let decoder = TestDecoding;
		let line = r#"table "public"."t": UPDATE: name[text]:null"#;
		let msg = decoder.decode(line.as_bytes(), Lsn::new(1)).unwrap();
		match msg {
			Message::Change { change, .. } => assert_eq!(change.columns[0].data, ColumnData::Null),
			_ => panic!("expected a Change message"),
		}
	}
}
