// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("enumeration query failed: {0}")]
	Query(#[source] tokio_postgres::Error),
	#[error(transparent)]
	Catalog(#[from] pgferry_catalog::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
