// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("catalog store I/O error: {0}")]
	Sqlite(#[from] rusqlite::Error),
	#[error("catalog store holds no row for {0}")]
	NotFound(String),
	#[error(transparent)]
	Core(#[from] pgferry_core::Error),
	#[error("catalog row is corrupt: {0}")]
	Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
