// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("malformed decoder output: {0}")]
	Decode(String),
	#[error("journal I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("journal record did not parse: {0}")]
	Json(#[from] serde_json::Error),
	#[error("lsn error: {0}")]
	Lsn(#[from] pgferry_core::lsn::LsnParseError),
	#[error("journal records out of order: {prev} then {next}")]
	OutOfOrder { prev: String, next: String },
}

pub type Result<T> = std::result::Result<T, Error>;
