// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Named session GUCs forced on every data session, so the same literal
//! isn't retyped in every worker.

/// Disables server-side statement timeouts on long-running COPY/DDL.
pub const STATEMENT_TIMEOUT: &str = "SET statement_timeout = 0";

/// Disables server-side lock-wait timeouts for the same reason.
pub const LOCK_TIMEOUT: &str = "SET lock_timeout = 0";

/// Never let an idle data session be killed mid-run.
pub const IDLE_IN_TRANSACTION_SESSION_TIMEOUT: &str = "SET idle_in_transaction_session_timeout = 0";

/// Skips WAL-logging of the rows a COPY writes when the target can be
/// rebuilt from scratch on crash (single-partition, non-concurrent mode
/// only).
pub const FREEZE_ROWS_ON_COPY: &str = "SET synchronous_commit = off";

pub fn disable_triggers(table: &str) -> String {
	format!("ALTER TABLE {table} DISABLE TRIGGER ALL")
}

pub fn enable_triggers(table: &str) -> String {
	format!("ALTER TABLE {table} ENABLE TRIGGER ALL")
}

/// All session GUCs a copy-worker session applies before running a job.
pub fn bulk_load_session_gucs(same_table_concurrency: bool) -> Vec<&'static str> {
	let mut gucs = vec![STATEMENT_TIMEOUT, LOCK_TIMEOUT, IDLE_IN_TRANSACTION_SESSION_TIMEOUT];
	if !same_table_concurrency {
		gucs.push(FREEZE_ROWS_ON_COPY);
	}
	gucs
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_table_concurrency_skips_freeze_rows() {
		assert!(!bulk_load_session_gucs(true).contains(&FREEZE_ROWS_ON_COPY));
		assert!(bulk_load_session_gucs(false).contains(&FREEZE_ROWS_ON_COPY));
	}
}
