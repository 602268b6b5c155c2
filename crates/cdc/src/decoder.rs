// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! `DecoderPlugin`: the trait requires so the Receiver can be
//! generic over "a configurable decoder plugin", with two dialects
//! implementing it (the JSON-object dialect and text dialect).

use pgferry_core::Lsn;

use crate::error::Result;
use crate::message::Message;

/// Decodes one raw logical-replication payload into a [`Message`]. `lsn` is
/// the LSN the server attached to this WAL record; dialects that also embed
/// their own LSN field (wal2json) must agree with it, and implementations
/// may use either source as long as they're consistent — callers always
/// pass the server-reported LSN, which is authoritative.
pub trait DecoderPlugin: Send + Sync {
	fn decode(&self, raw: &[u8], lsn: Lsn) -> Result<Message>;

	/// A short name used in logs and in the `PGFERRY_OUTPUT_PLUGIN` config
	/// surface.
	fn name(&self) -> &'static str;
}
