// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The Schema Enumerator: queries the source catalogs once,
//! under the shared snapshot, and populates the Catalog Store with the
//! ordered work lists the rest of the run drains.

mod enumerator;
mod error;
mod partition_plan;
mod queries;

pub use enumerator::{EnumerationConfig, SchemaEnumerator};
pub use error::{Error, Result};
pub use partition_plan::{IntKeyRange, PhysicalExtent, plan_partitions};
