//! Hypothetical-index session commands.
//!
//! Builds the ordered command lists that simulate candidate indexes with the
//! `hypopg` extension and cost workload statements against them. Order is
//! load-bearing: the extension is loaded before any index is created, every
//! index exists before the first `PREPARE`, and the distributed-planning
//! flags are set before anything is explained.
//!
//! Two entry points share that preamble:
//!
//! - [`workload_cost_sqls`] evaluates a whole workload and leaves the
//!   virtual indexes in place. The caller must run [`hypo_reset_sql`] or
//!   discard the session afterwards.
//! - [`index_check_sqls`] evaluates one query, always ends with the reset
//!   command, and returns a [`HypoIndexRegistry`] to map the engine's
//!   hypothetical index names back to candidates.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdvisorError, Result};
use crate::ident::TrustedIdent;
use crate::prepared::PreparedStatementCache;

/// Settings that make the planner cost plans the way a multi-node cluster
/// executes them.
pub const MULTI_NODE_FLAGS: [&str; 2] = [
    "set enable_fast_query_shipping = off;",
    "set enable_stream_operator = on;",
];

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A proposed index under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CandidateDef", into = "CandidateDef")]
pub struct IndexCandidate {
    table: TrustedIdent,
    columns: Vec<TrustedIdent>,
    index_type: String,
}

#[derive(Serialize, Deserialize)]
struct CandidateDef {
    table: TrustedIdent,
    columns: Vec<TrustedIdent>,
    #[serde(default)]
    index_type: String,
}

impl IndexCandidate {
    /// Create a candidate on `table` (optionally schema-qualified) over
    /// `columns` in order. At least one column is required.
    pub fn new(table: TrustedIdent, columns: Vec<TrustedIdent>) -> Result<Self> {
        if columns.is_empty() {
            return Err(AdvisorError::invalid_identifier(
                table.as_str(),
                "index candidate has no columns",
            ));
        }
        Ok(Self {
            table,
            columns,
            index_type: String::new(),
        })
    }

    /// Validate plain strings and build a candidate.
    pub fn parse(table: &str, columns: &[&str]) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|c| TrustedIdent::new(*c))
            .collect::<Result<Vec<_>>>()?;
        Self::new(TrustedIdent::new(table)?, columns)
    }

    /// Trailing clause after the column list, e.g. `LOCAL` or `GLOBAL` for
    /// partitioned tables. Embedded verbatim inside a string literal, so a
    /// clause containing a single quote is rejected.
    pub fn with_index_type(mut self, index_type: impl Into<String>) -> Result<Self> {
        let index_type = index_type.into();
        if index_type.contains('\'') {
            return Err(AdvisorError::invalid_identifier(
                index_type,
                "index type clause must not contain single quotes",
            ));
        }
        self.index_type = index_type;
        Ok(self)
    }

    pub fn table(&self) -> &TrustedIdent {
        &self.table
    }

    pub fn columns(&self) -> &[TrustedIdent] {
        &self.columns
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    /// Columns joined the way they appear in `CREATE INDEX`.
    pub fn columns_sql(&self) -> String {
        join_idents(&self.columns, ", ")
    }

    /// Registry key: bare table name and columns joined by underscores.
    pub fn registry_key(&self) -> String {
        format!(
            "{}_{}",
            self.table.bare_name(),
            join_idents(&self.columns, "_")
        )
    }
}

impl TryFrom<CandidateDef> for IndexCandidate {
    type Error = AdvisorError;

    fn try_from(def: CandidateDef) -> Result<Self> {
        Self::new(def.table, def.columns)?.with_index_type(def.index_type)
    }
}

impl From<IndexCandidate> for CandidateDef {
    fn from(candidate: IndexCandidate) -> Self {
        Self {
            table: candidate.table,
            columns: candidate.columns,
            index_type: candidate.index_type,
        }
    }
}

fn join_idents(idents: &[TrustedIdent], sep: &str) -> String {
    idents
        .iter()
        .map(TrustedIdent::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Where a hypothetical index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypoIndexOrigin<'a> {
    /// Bare table name
    pub table: &'a str,
    /// Column list as written in `CREATE INDEX`
    pub columns: &'a str,
}

/// Maps `<table>_<col1>_<col2>` keys to the candidate's columns and table.
///
/// Lives for one evaluation call. When two candidates produce the same key
/// the first one registered wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HypoIndexRegistry {
    columns: HashMap<String, String>,
    tables: HashMap<String, String>,
}

impl HypoIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a candidate. Returns false if its key was already taken.
    pub fn register(&mut self, index: &IndexCandidate) -> bool {
        let key = index.registry_key();
        match self.columns.entry(key.clone()) {
            Entry::Occupied(_) => {
                warn!(key = %key, "hypothetical index key already registered, keeping first");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(index.columns_sql());
                self.tables
                    .entry(key)
                    .or_insert_with(|| index.table().bare_name().to_string());
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<HypoIndexOrigin<'_>> {
        Some(HypoIndexOrigin {
            columns: self.columns.get(key)?,
            table: self.tables.get(key)?,
        })
    }

    /// Resolve a name reported by the engine, such as `<13382>btree_orders_a_b`.
    ///
    /// The `<oid>` prefix and the access-method prefix are stripped. A name
    /// cut at the engine's identifier limit resolves when exactly one key
    /// starts with the remaining text; shorter names must match a key exactly.
    pub fn resolve(&self, engine_name: &str) -> Option<HypoIndexOrigin<'_>> {
        let engine_name = engine_name.trim();
        let truncated = engine_name.len() >= MAX_IDENTIFIER_BYTES;
        let caps = hypo_name_pattern().captures(engine_name)?;
        let rest = caps.name("rest")?.as_str();

        let mut candidates = Vec::with_capacity(2);
        if let Some(am) = caps.name("am") {
            candidates.push(&rest[am.as_str().len() + 1..]);
        }
        candidates.push(rest);

        for name in candidates {
            if let Some(origin) = self.get(name) {
                return Some(origin);
            }
            if !truncated {
                continue;
            }
            let mut prefixed = self.columns.keys().filter(|k| k.starts_with(name));
            if let (Some(key), None) = (prefixed.next(), prefixed.next()) {
                return self.get(key);
            }
        }
        None
    }

    /// Key -> column list.
    pub fn columns_by_key(&self) -> &HashMap<String, String> {
        &self.columns
    }

    /// Key -> bare table name.
    pub fn tables_by_key(&self) -> &HashMap<String, String> {
        &self.tables
    }

    pub fn into_maps(self) -> (HashMap<String, String>, HashMap<String, String>) {
        (self.columns, self.tables)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Longest identifier the engine keeps (`NAMEDATALEN - 1`); longer
/// hypothetical index names are cut to this many bytes.
const MAX_IDENTIFIER_BYTES: usize = 63;

fn hypo_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^<\d+>(?P<rest>(?:(?P<am>btree|hash|gin|gist|brin|spgist|ubtree|psort|cbtree)_)?.+)$")
            .expect("static regex is valid")
    })
}

// ---------------------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------------------

/// `LOAD '<extension>';`
pub fn load_extension_sql(extension: &str) -> String {
    format!("LOAD '{}';", extension)
}

/// The call that simulates one candidate. Identifiers are embedded verbatim.
pub fn create_hypo_index_sql(index: &IndexCandidate) -> String {
    let mut ddl = format!("CREATE INDEX ON {}({})", index.table(), index.columns_sql());
    if !index.index_type().is_empty() {
        ddl.push(' ');
        ddl.push_str(index.index_type());
    }
    format!("SELECT pg_catalog.hypopg_create_index('{}');", ddl)
}

/// Drops every hypothetical index in the session.
pub fn hypo_reset_sql() -> String {
    "SELECT pg_catalog.hypopg_reset_index();".to_string()
}

/// Extension load and index creation (only when `indexes` is non-empty),
/// followed by the multi-node flags when requested.
pub fn index_setting_sqls(
    extension: &str,
    indexes: &[IndexCandidate],
    multi_node: bool,
) -> Vec<String> {
    let mut sqls = Vec::with_capacity(indexes.len() + 3);
    if !indexes.is_empty() {
        sqls.push(load_extension_sql(extension));
        sqls.extend(indexes.iter().map(create_hypo_index_sql));
    }
    if multi_node {
        sqls.extend(MULTI_NODE_FLAGS.iter().map(|s| s.to_string()));
    }
    sqls
}

/// Commands costing every statement of a workload under `indexes`.
///
/// Statements keep their input order; repeated statements reuse their
/// prepared identifier. The virtual indexes are not torn down. A statement
/// that fails normalization aborts the whole call with
/// [`AdvisorError::Workload`] carrying its position.
pub fn workload_cost_sqls<S: AsRef<str>>(
    cache: &PreparedStatementCache,
    extension: &str,
    statements: &[S],
    indexes: &[IndexCandidate],
    multi_node: bool,
) -> Result<Vec<String>> {
    let mut sqls = index_setting_sqls(extension, indexes, multi_node);
    sqls.reserve(statements.len() * 3);
    for (index, statement) in statements.iter().enumerate() {
        let entry = cache.get_prepare_sqls(statement.as_ref()).map_err(|e| {
            warn!(index, error = %e, "workload statement rejected");
            AdvisorError::in_workload(index, e)
        })?;
        sqls.extend(entry.to_vec());
    }
    debug!(
        statements = statements.len(),
        indexes = indexes.len(),
        commands = sqls.len(),
        "built workload cost commands"
    );
    Ok(sqls)
}

/// Commands for one query plus the registry of candidates it simulates.
#[derive(Debug, Clone)]
pub struct IndexCheckCommands {
    pub commands: Vec<String>,
    pub registry: HypoIndexRegistry,
}

/// Self-contained single-query evaluation that always ends with a reset.
pub fn index_check_sqls(
    cache: &PreparedStatementCache,
    extension: &str,
    query: &str,
    indexes: &[IndexCandidate],
    multi_node: bool,
) -> Result<IndexCheckCommands> {
    let mut registry = HypoIndexRegistry::new();
    for index in indexes {
        registry.register(index);
    }

    let mut commands = index_setting_sqls(extension, indexes, multi_node);
    let entry = cache.get_prepare_sqls(query)?;
    commands.extend(entry.to_vec());
    commands.push(hypo_reset_sql());

    debug!(
        indexes = indexes.len(),
        registered = registry.len(),
        commands = commands.len(),
        "built index check commands"
    );
    Ok(IndexCheckCommands { commands, registry })
}
