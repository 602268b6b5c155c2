// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! DDL for `<workdir>/schema/source.db`. Applied with `CREATE TABLE IF NOT
//! EXISTS` and guarded by `PRAGMA user_version`, so re-opening an existing
//! store across restarts never re-runs destructive migrations.

pub const CURRENT_USER_VERSION: i64 = 2;

pub const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS source_object (
    oid             INTEGER NOT NULL,
    kind            TEXT    NOT NULL,
    schema_name     TEXT    NOT NULL,
    object_name     TEXT    NOT NULL,
    restore_list_name TEXT  NOT NULL,
    ordering_key    INTEGER NOT NULL,
    lifecycle       TEXT    NOT NULL,
    error           TEXT,
    PRIMARY KEY (kind, oid)
);

CREATE TABLE IF NOT EXISTS table_partition (
    table_oid       INTEGER NOT NULL,
    part_number     INTEGER NOT NULL,
    total_parts     INTEGER NOT NULL,
    predicate_json  TEXT    NOT NULL,
    lifecycle       TEXT    NOT NULL,
    PRIMARY KEY (table_oid, part_number)
);

CREATE TABLE IF NOT EXISTS index_def (
    oid               INTEGER PRIMARY KEY,
    table_oid         INTEGER NOT NULL,
    name              TEXT NOT NULL,
    create_statement  TEXT NOT NULL,
    backs_constraint  INTEGER,
    lifecycle         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS constraint_def (
    oid         INTEGER PRIMARY KEY,
    index_oid   INTEGER NOT NULL,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    definition  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dependency_edge (
    from_oid  INTEGER NOT NULL,
    to_oid    INTEGER NOT NULL,
    PRIMARY KEY (from_oid, to_oid)
);

CREATE TABLE IF NOT EXISTS sentinel (
    id          INTEGER PRIMARY KEY CHECK (id = 0),
    startpos    TEXT NOT NULL,
    endpos      TEXT,
    write_lsn   TEXT NOT NULL,
    flush_lsn   TEXT NOT NULL,
    replay_lsn  TEXT NOT NULL,
    apply       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS process_row (
    pid             INTEGER PRIMARY KEY,
    role            TEXT NOT NULL,
    start_time_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS statement_entry (
    hash                 TEXT PRIMARY KEY,
    sql_with_placeholders TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS run_state (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Opens (creating if absent) the catalog store file and applies the
/// schema idempotently.
pub fn migrate(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
	let user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
	conn.execute_batch(CREATE_TABLES_SQL)?;
	if user_version < CURRENT_USER_VERSION {
		conn.pragma_update(None, "user_version", CURRENT_USER_VERSION)?;
	}
	Ok(())
}
