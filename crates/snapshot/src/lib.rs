// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Snapshot Coordinator: one serializable deferrable
//! read-only snapshot exported on the source at startup and imported by
//! every worker that must observe the same point-in-time.

mod coordinator;
mod error;

pub use coordinator::{SnapshotCoordinator, import};
pub use error::{Error, Result};
