// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("source session error: {0}")]
	Source(#[source] tokio_postgres::Error),
	#[error("target session error: {0}")]
	Target(#[source] tokio_postgres::Error),
	#[error(transparent)]
	Snapshot(#[from] pgferry_snapshot::Error),
	#[error(transparent)]
	Catalog(#[from] pgferry_catalog::Error),
	#[error("job referenced an object the catalog has no row for: {0}")]
	UnknownObject(String),
	#[error("COPY stream failed: {0}")]
	CopyStream(String),
}

pub type Result<T> = std::result::Result<T, Error>;
