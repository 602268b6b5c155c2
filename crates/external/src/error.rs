// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to launch {tool:?}: {source}")]
	Spawn { tool: String, #[source] source: std::io::Error },
	#[error("{tool} exited with status {status}: {stderr}")]
	ToolFailed { tool: String, status: i32, stderr: String },
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("malformed table-of-contents line: {0:?}")]
	MalformedTocLine(String),
}

pub type Result<T> = std::result::Result<T, Error>;
