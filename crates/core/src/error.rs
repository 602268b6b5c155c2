// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

/// Errors arising from the shared primitives in this crate (LSN parsing,
/// partition-predicate construction). Higher-level crates define their own
/// `Error` enums and wrap this one with `#[from]`.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid lsn: {0}")]
	Lsn(#[from] crate::lsn::LsnParseError),
	#[error("sentinel invariant violated: {0}")]
	SentinelInvariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
