// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Shared types for every other pgferry crate: the embedded LSN type, source
//! identifiers, the data-model entities, session GUC constants, run
//! configuration, and a cancellation token threaded through every
//! blocking call.

pub mod cancel;
pub mod config;
pub mod error;
pub mod guc;
pub mod ids;
pub mod lsn;
pub mod model;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use ids::{Oid, QualifiedName};
pub use lsn::Lsn;
