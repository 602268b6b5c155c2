// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The `pg_catalog` queries the enumerator runs once per table kind, all
//! inside the caller's already-imported shared snapshot.

/// Ordinary and partitioned tables, ordered by estimated row count
/// descending, with the bytes-estimate used for the
/// partitioning decision.
pub const LIST_TABLES: &str = r#"
SELECT c.oid,
       n.nspname AS schema_name,
       c.relname AS table_name,
       GREATEST(c.reltuples, 0)::bigint AS estimated_rows,
       pg_total_relation_size(c.oid) AS estimated_bytes,
       c.relpages AS relpages
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p')
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
ORDER BY estimated_rows DESC, c.oid ASC
"#;

/// The single-column not-null unique integer key of a table, if one exists
/// (used to decide integer-range partitioning).
pub const FIND_INT_KEY: &str = r#"
SELECT a.attname, a.atttypid
FROM pg_index i
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = i.indkey[0]
WHERE i.indrelid = $1
  AND i.indisunique
  AND i.indnkeyatts = 1
  AND a.attnotnull
  AND a.atttypid IN (20, 21, 23) -- int8, int2, int4
LIMIT 1
"#;

/// The observed min/max of a candidate integer key column, evaluated under
/// the shared snapshot. `%s` is substituted with the quoted column name by
/// the caller since it cannot be bound as a parameter.
pub const MIN_MAX_TEMPLATE: &str = "SELECT min({column})::bigint, max({column})::bigint FROM {table}";

/// Indexes grouped by owning table, carrying the full creation statement via
/// `pg_get_indexdef`.
pub const LIST_INDEXES: &str = r#"
SELECT i.indexrelid,
       i.indrelid,
       c.relname AS index_name,
       pg_get_indexdef(i.indexrelid) AS create_statement
FROM pg_index i
JOIN pg_class c ON c.oid = i.indexrelid
JOIN pg_class t ON t.oid = i.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
ORDER BY i.indrelid ASC, i.indexrelid ASC
"#;

/// Constraints grouped by owning index, for the promote-to-constraint step.
pub const LIST_CONSTRAINTS: &str = r#"
SELECT con.oid, con.conindid, con.conname, con.contype, pg_get_constraintdef(con.oid) AS definition
FROM pg_constraint con
WHERE con.conindid <> 0
ORDER BY con.conindid ASC, con.oid ASC
"#;

pub const LIST_SEQUENCES: &str = r#"
SELECT c.oid, n.nspname, c.relname
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind = 'S'
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
ORDER BY c.oid ASC
"#;

pub const READ_SEQUENCE_VALUE: &str = "SELECT last_value FROM {qualified_name}";

pub const LIST_LARGE_OBJECTS: &str = "SELECT oid FROM pg_largeobject_metadata ORDER BY oid ASC";

pub const LIST_EXTENSIONS: &str = "SELECT oid, extname FROM pg_extension ORDER BY oid ASC";

pub const LIST_COLLATIONS: &str = r#"
SELECT c.oid, n.nspname, c.collname
FROM pg_collation c
JOIN pg_namespace n ON n.oid = c.collnamespace
WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
ORDER BY c.oid ASC
"#;

/// Dependency edges between non-catalog objects, used later to filter the
/// post-data archive.
pub const LIST_DEPEND_EDGES: &str = r#"
SELECT d.objid, d.refobjid
FROM pg_depend d
JOIN pg_class co ON co.oid = d.objid
JOIN pg_class ro ON ro.oid = d.refobjid
WHERE d.deptype IN ('n', 'a')
  AND co.oid <> ro.oid
"#;
