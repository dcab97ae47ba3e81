//! Prepared-statement naming and memoization.
//!
//! Each distinct workload statement is evaluated through a
//! `PREPARE` / `EXPLAIN EXECUTE` / `DEALLOCATE PREPARE` triple. The cache
//! hands out session-unique identifiers from a counter that only moves
//! forward, and remembers the triple under the statement's original text so
//! a statement repeated in the workload reuses the statement it already
//! prepared.
//!
//! # Example
//!
//! ```rust
//! use hypocost::prepared::PreparedStatementCache;
//!
//! let cache = PreparedStatementCache::default();
//! let entry = cache.get_prepare_sqls("SELECT * FROM t WHERE id = $1").unwrap();
//! assert_eq!(entry.prepare_sql(), "prepare prepare_0 as SELECT * FROM t WHERE id = $1");
//! assert_eq!(entry.explain_sql(), "explain execute prepare_0(NULL)");
//! assert_eq!(entry.deallocate_sql(), "deallocate prepare prepare_0");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{AdvisorError, Result};
use crate::placeholder::normalize_placeholders;

/// The three commands that evaluate one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatementEntry {
    id: u64,
    name: String,
    parameter_count: usize,
    prepare: String,
    explain: String,
    deallocate: String,
}

impl PreparedStatementEntry {
    fn new(id: u64, prefix: &str, normalized: &str, parameter_count: usize) -> Self {
        let name = format!("{}{}", prefix, id);
        let args = if parameter_count == 0 {
            String::new()
        } else {
            format!("({})", vec!["NULL"; parameter_count].join(","))
        };
        Self {
            prepare: format!("prepare {} as {}", name, normalized),
            explain: format!("explain execute {}{}", name, args),
            deallocate: format!("deallocate prepare {}", name),
            id,
            name,
            parameter_count,
        }
    }

    /// Counter value this entry was allocated.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Prepared statement name, e.g. `prepare_0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn prepare_sql(&self) -> &str {
        &self.prepare
    }

    pub fn explain_sql(&self) -> &str {
        &self.explain
    }

    pub fn deallocate_sql(&self) -> &str {
        &self.deallocate
    }

    /// `[prepare, explain, deallocate]` in execution order.
    pub fn commands(&self) -> [&str; 3] {
        [&self.prepare, &self.explain, &self.deallocate]
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.commands().iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug)]
struct CacheState {
    next_id: u64,
    /// Every identifier issued so far is at most this value.
    last_issued: Option<u64>,
    entries: HashMap<String, Arc<PreparedStatementEntry>>,
}

/// Statement text -> prepared-statement commands, with a monotonic counter.
///
/// Lookup, identifier allocation and insertion happen under one lock, so a
/// shared cache never gives two statements the same identifier. There is no
/// eviction; [`clear`](Self::clear) drops entries but never rewinds the
/// counter.
#[derive(Debug)]
pub struct PreparedStatementCache {
    prefix: String,
    state: Mutex<CacheState>,
}

impl PreparedStatementCache {
    /// Create a cache whose identifiers are `prefix` followed by the counter,
    /// starting at `start_id`.
    pub fn new(prefix: impl Into<String>, start_id: u64) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(CacheState {
                next_id: start_id,
                last_issued: None,
                entries: HashMap::new(),
            }),
        }
    }

    /// Get the cached commands for `statement`, creating them on first use.
    ///
    /// A statement that fails normalization does not consume an identifier.
    pub fn get_prepare_sqls(&self, statement: &str) -> Result<Arc<PreparedStatementEntry>> {
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get(statement) {
            trace!(name = %entry.name(), "prepared statement cache hit");
            return Ok(Arc::clone(entry));
        }

        let normalized = normalize_placeholders(statement)?;

        let id = state.next_id;
        if let Some(last) = state.last_issued {
            if id <= last {
                return Err(AdvisorError::cache_consistency(format!(
                    "identifier {} allocated after {}",
                    id, last
                )));
            }
        }
        state.next_id = id
            .checked_add(1)
            .ok_or_else(|| AdvisorError::cache_consistency("identifier counter exhausted"))?;
        state.last_issued = Some(id);

        let entry = Arc::new(PreparedStatementEntry::new(
            id,
            &self.prefix,
            normalized.text(),
            normalized.parameter_count(),
        ));
        debug!(
            name = %entry.name(),
            parameters = entry.parameter_count(),
            rewritten = normalized.is_rewritten(),
            "prepared statement allocated"
        );
        state
            .entries
            .insert(statement.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Look up a statement without allocating.
    pub fn get(&self, statement: &str) -> Option<Arc<PreparedStatementEntry>> {
        self.state.lock().entries.get(statement).cloned()
    }

    /// Drop all memoized entries. Identifiers already issued stay retired.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        debug!(entries = state.entries.len(), "clearing prepared statement cache");
        state.entries.clear();
    }

    /// The identifier the next new statement will receive.
    pub fn next_id(&self) -> u64 {
        self.state.lock().next_id
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for PreparedStatementCache {
    fn default() -> Self {
        Self::new("prepare_", 0)
    }
}
