// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("source connection failed: {0}")]
	Connect(#[source] tokio_postgres::Error),
	#[error("snapshot export failed: {0}")]
	Export(#[source] tokio_postgres::Error),
	#[error("snapshot import failed: {0}")]
	Import(#[source] tokio_postgres::Error),
	#[error("the export session ended before every worker imported its snapshot")]
	SessionLost,
}

pub type Result<T> = std::result::Result<T, Error>;
