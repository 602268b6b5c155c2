// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Pure CDC data formats: the decoded [`Message`]
//! model every [`DecoderPlugin`] dialect produces, the Journal Segment
//! on-disk format, and the statement-file encoding the Transformer emits
//! and the Applier consumes. Nothing in this crate touches the catalog or
//! a live connection — that orchestration lives in `pgferry-replication`.

mod decoder;
mod error;
mod journal;
mod message;
mod statement_file;
mod test_decoding;
mod wal2json;

pub use decoder::DecoderPlugin;
pub use error::{Error, Result};
pub use journal::{
	list_finalized_segments, read_segment, segment_path, JournalEntry, JournalRecord, JournalWriter,
	JOURNAL_EXTENSION, PARTIAL_SUFFIX,
};
pub use message::{ChangeKind, ColumnData, ColumnValue, Message, RowChange};
pub use statement_file::{
	parse_line, quote_identifier, render_change, render_literal, shape_hash, ControlMarker, ParsedLine, StatementLine,
};
pub use test_decoding::TestDecoding;
pub use wal2json::Wal2Json;

/// Resolves a dialect name (the `PGFERRY_OUTPUT_PLUGIN`) to a
/// [`DecoderPlugin`] instance.
pub fn decoder_for(plugin_name: &str) -> Result<Box<dyn DecoderPlugin>> {
	match plugin_name {
		"wal2json" => Ok(Box::new(Wal2Json)),
		"test_decoding" => Ok(Box::new(TestDecoding)),
		other => Err(Error::Decode(format!("unknown decoder plugin {other:?}"))),
	}
}
