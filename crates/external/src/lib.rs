// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! External schema tool orchestration: the
//! system shells out to a dump/restore binary pair named by configuration
//! rather than linking against them, and parses their archive
//! table-of-contents with a small hand-rolled line parser since no crate
//! exposes that format as a library.

mod dump_restore;
mod error;
mod toc;

pub use dump_restore::{dump_section, list_toc, restore_section, ExternalToolsConfig, Section};
pub use error::{Error, Result};
pub use toc::{build_post_data_filter, parse_toc, parse_toc_strict, render_filter_list, TocEntry};
