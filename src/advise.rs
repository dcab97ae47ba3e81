//! Single-statement advice through the engine's built-in advisor.
//!
//! This is the only place where workload text is embedded as a string
//! literal, so it is the injection surface of the crate. Quotes are doubled
//! one character at a time; an input that already contains `''` comes out
//! as `''''`, which the engine reads back as the original two quotes.

/// Function called when no other name is configured.
pub const DEFAULT_INDEX_ADVISE_FUNCTION: &str = "pg_catalog.gs_index_advise";

/// `select pg_catalog.gs_index_advise('<raw_sql>');` with quotes escaped.
pub fn get_single_advisor_sql(raw_sql: &str) -> String {
    single_advisor_sql_with(DEFAULT_INDEX_ADVISE_FUNCTION, raw_sql)
}

/// Like [`get_single_advisor_sql`] with a different advisor function.
pub fn single_advisor_sql_with(function: &str, raw_sql: &str) -> String {
    let mut sql = String::with_capacity(function.len() + raw_sql.len() + 16);
    sql.push_str("select ");
    sql.push_str(function);
    sql.push_str("('");
    push_escaped_literal(&mut sql, raw_sql);
    sql.push_str("');");
    sql
}

/// Append `text` with every `'` doubled.
pub fn push_escaped_literal(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
}
