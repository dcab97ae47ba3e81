//! Read-only catalog introspection queries.
//!
//! Every builder interpolates names directly into the SQL text: nothing is
//! quoted or escaped. Arguments are [`TrustedIdent`]s for that reason; build
//! them with [`TrustedIdent::new`] when the names come from anywhere other
//! than the catalog itself.
//!
//! Names are compared against `relname` and `nspname` inside string literals,
//! and those columns hold the stored form of a name. A double-quoted
//! identifier such as `"Order Lines"` keeps its quotes in the literal and so
//! never matches. Pass unquoted names; a table whose stored name needs
//! quoting cannot be addressed through these builders.
//! [`TrustedIdent::new`] rejects `'` in quoted parts, so a name can never end
//! the literal early.

use crate::ident::TrustedIdent;

/// Indexes on `tables` in `schema`, with their definition and a primary-key
/// flag (`p` when the index backs the primary key).
///
/// Columns: `tablename`, `indexname`, `indexdef`, `pkey`.
pub fn get_existing_index_sql(schema: &TrustedIdent, tables: &[TrustedIdent]) -> String {
    let tables_string = tables
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "SELECT c.relname AS tablename, i.relname AS indexname, \
         pg_catalog.pg_get_indexdef(i.oid) AS indexdef, p.contype AS pkey from \
         pg_index x JOIN pg_class c ON c.oid = x.indrelid JOIN \
         pg_class i ON i.oid = x.indexrelid LEFT JOIN pg_namespace n \
         ON n.oid = c.relnamespace LEFT JOIN pg_constraint p ON (i.oid = p.conindid \
         AND p.contype = 'p') WHERE (c.relkind = ANY (ARRAY['r'::\"char\", \
         'm'::\"char\"])) AND (i.relkind = ANY (ARRAY['i'::\"char\", 'I'::\"char\"])) \
         AND n.nspname = '{}' AND c.relname in ({}) order by c.relname;",
        schema, tables_string
    )
}

/// Row-count estimate and partition flag. Columns: `reltuples`, `relispartition`.
pub fn get_table_info_sql(table: &TrustedIdent, schema: &TrustedIdent) -> String {
    format!(
        "select reltuples, relispartition from pg_class where relname ilike '{}' and \
         relnamespace = (select oid from pg_namespace where nspname = '{}');",
        table, schema
    )
}

/// Planner distinct-value estimate per column. Columns: `n_distinct`, `attname`.
pub fn get_column_info_sql(table: &TrustedIdent, schema: &TrustedIdent) -> String {
    format!(
        "select n_distinct, attname from pg_stats where tablename ilike '{}' \
         and schemaname = '{}';",
        table, schema
    )
}

/// Total on-disk size of every table in `schema`, indexes and TOAST included.
pub fn get_schema_size_sql(schema: &TrustedIdent) -> String {
    format!(
        "SELECT SUM(pg_total_relation_size(quote_ident(table_name))) \
         FROM information_schema.tables \
         WHERE table_schema = '{}';",
        schema
    )
}

/// Total on-disk size of one table. Column: `total_storage_size`.
pub fn get_table_size_sql(table: &TrustedIdent) -> String {
    format!(
        "SELECT pg_total_relation_size(quote_ident('{}')) AS total_storage_size;",
        table
    )
}
