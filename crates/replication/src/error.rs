// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("replication connection error: {0}")]
	Connect(#[source] tokio_postgres::Error),
	#[error("replication protocol error: {0}")]
	Protocol(#[source] tokio_postgres::Error),
	#[error("malformed replication stream message: {0}")]
	Stream(String),
	#[error(transparent)]
	Decode(#[from] pgferry_cdc::Error),
	#[error(transparent)]
	Catalog(#[from] pgferry_catalog::Error),
	#[error("journal I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("no replication slot named {0:?} and creation was not requested")]
	MissingSlot(String),
	#[error("target session error: {0}")]
	Target(#[source] tokio_postgres::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
