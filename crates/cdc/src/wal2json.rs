// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The JSON-object decoder dialect: matches the common
//! `wal2json` output shape,
//! `{"action":"I"|"U"|"D"|"B"|"C","xid":…,"lsn":"X/Y","columns":[…]}`.

use pgferry_core::Lsn;
use serde::Deserialize;

use crate::decoder::DecoderPlugin;
use crate::error::{Error, Result};
use crate::message::{ChangeKind, ColumnData, ColumnValue, Message, RowChange};

#[derive(Debug, Deserialize)]
struct RawEnvelope {
	action: String,
	xid: Option<u32>,
	#[allow(dead_code)]
	lsn: Option<String>,
	schema: Option<String>,
	table: Option<String>,
	columns: Option<Vec<RawColumn>>,
	#[serde(rename = "identity")]
	old_columns: Option<Vec<RawColumn>>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
	name: String,
	#[serde(rename = "type")]
	type_name: String,
	value: Option<serde_json::Value>,
	#[serde(default)]
	unchanged_toast: bool,
}

pub struct Wal2Json;

impl DecoderPlugin for Wal2Json {
	fn name(&self) -> &'static str {
		"wal2json"
	}

	fn decode(&self, raw: &[u8], lsn: Lsn) -> Result<Message> {
		let envelope: RawEnvelope = serde_json::from_slice(raw)?;
		let xid = envelope.xid.unwrap_or(0);

		match envelope.action.as_str() {
			"B" => Ok(Message::Begin { xid, lsn }),
			"C" => Ok(Message::Commit { xid, lsn }),
			"I" | "U" | "D" => {
				let kind = match envelope.action.as_str() {
					"I" => ChangeKind::Insert,
					"U" => ChangeKind::Update,
					"D" => ChangeKind::Delete,
					_ => unreachable!(),
				};
				let schema = envelope.schema.ok_or_else(|| Error::Decode("change missing schema".into()))?;
				let table = envelope.table.ok_or_else(|| Error::Decode("change missing table".into()))?;
				let columns = envelope.columns.unwrap_or_default().into_iter().map(to_column_value).collect();
				let old_columns = envelope.old_columns.unwrap_or_default().into_iter().map(to_column_value).collect();
				Ok(Message::Change {
					xid,
					lsn,
					change: RowChange { schema, table, kind, columns, old_columns },
				})
			}
			other => Err(Error::Decode(format!("unknown wal2json action {other:?}"))),
		}
	}
}

fn to_column_value(raw: RawColumn) -> ColumnValue {
	let data = if raw.unchanged_toast {
		ColumnData::Unchanged
	} else {
		match raw.value {
			None | Some(serde_json::Value::Null) => ColumnData::Null,
			Some(serde_json::Value::String(s)) => {
				if let Some(hex) = s.strip_prefix("\\x") {
					match hex::decode(hex) {
						Ok(bytes) => ColumnData::Binary(bytes),
						Err(_) => ColumnData::Text(s),
					}
				} else {
					ColumnData::Text(s)
				}
			}
			Some(other) => ColumnData::Text(other.to_string()),
		}
	};
	ColumnValue { name: raw.name, type_name: raw.type_name, data }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_begin_and_commit() {
		let decoder = Wal2Json;
		let lsn = Lsn::new(100);
		let begin = decoder.decode(br#"{"action":"B","xid":501}"#, lsn).unwrap();
		assert_eq!(begin, Message::Begin { xid: 501, lsn });

		let commit = decoder.decode(br#"{"action":"C","xid":501}"#, lsn).unwrap();
		assert_eq!(commit, Message::Commit { xid: 501, lsn });
	}

	#[test]
	fn decodes_an_insert_with_typed_columns() {
		let decoder = Wal2Json;
		let lsn = Lsn::new(200);
		let raw = br#"{
            "action":"I","xid":777,"schema":"public","table":"category",
            "columns":[
                {"name":"category_id","type":"int4","value":1000},
                {"name":"name","type":"text","value":"Action"}
            ]
        }"#;
		let msg = decoder.decode(raw, lsn).unwrap();
		match msg {
			Message::Change { xid, change, .. } => {
				assert_eq!(xid, 777);
				assert_eq!(change.kind, ChangeKind::Insert);
				assert_eq!(change.columns.len(), 2);
				assert_eq!(change.columns[1].data, ColumnData::Text("Action".to_string()));
			}
			_ => panic!("expected a Change message"),
		}
	}

	#[test]
	fn decodes_binary_hex_values() {
		let decoder = Wal2Json;
		let raw = br#"{"action":"I","xid":1,"schema":"public","table":"t",
            "columns":[{"name":"b","type":"bytea","value":"\\x010203"}]}"#;
		let msg = decoder.decode(raw, Lsn::new(1)).unwrap();
		match msg {
			Message::Change { change, .. } => {
				assert_eq!(change.columns[0].data, ColumnData::Binary(vec![1, 2, 3]));
			}
			_ => panic!("expected a Change message"),
		}
	}

	#[test]
	fn unknown_action_is_a_decode_error() {
		let decoder = Wal2Json;
		assert!(decoder.decode(br#"{"action":"X"}"#, Lsn::new(1)).is_err());
	}
}
