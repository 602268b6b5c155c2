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
	Schema(#[from] pgferry_schema::Error),
	#[error(transparent)]
	Catalog(#[from] pgferry_catalog::Error),
	#[error(transparent)]
	Queue(#[from] pgferry_queue::Error),
	#[error(transparent)]
	Copy(#[from] pgferry_copy::Error),
	#[error(transparent)]
	Replication(#[from] pgferry_replication::Error),
	#[error(transparent)]
	External(#[from] pgferry_external::Error),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("run cancelled before {0} could complete")]
	Cancelled(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
