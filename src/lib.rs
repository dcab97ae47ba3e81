//! Hypocost - hypothetical-index cost evaluation commands
//!
//! Hypocost turns a SQL workload and a set of candidate indexes into the exact
//! sequence of commands that costs the workload under *virtual* indexes: the
//! `hypopg` extension simulates each candidate inside the planner, every
//! statement is prepared and explained under that virtual schema, and the
//! virtual state is torn down again. Nothing here talks to a database; the
//! caller runs the commands in order on a single session.
//!
//! # Features
//!
//! - **Placeholder normalization**: `?` markers become `$n`, function-call
//!   arguments are neutralized, malformed marker schemes are rejected
//! - **Stable prepared-statement names**: one identifier per distinct
//!   statement, never reused for the lifetime of a generator
//! - **Ordered session commands**: extension load, index creation and
//!   multi-node flags always precede the first `PREPARE`
//! - **Catalog introspection**: read-only queries for existing indexes, row
//!   counts, distinct-value estimates and storage size
//!
//! # Quick Start
//!
//! ```rust
//! use hypocost::{CommandGenerator, IndexCandidate, Result};
//!
//! fn main() -> Result<()> {
//!     let generator = CommandGenerator::new();
//!     let candidate = IndexCandidate::parse("public.orders", &["customer_id"])?;
//!
//!     let commands = generator.get_workload_cost_sqls(
//!         &["SELECT * FROM orders WHERE customer_id = ?"],
//!         &[candidate],
//!         false,
//!     )?;
//!
//!     assert_eq!(commands[0], "LOAD 'hypopg';");
//!     assert_eq!(commands[3], "explain execute prepare_0(NULL)");
//!
//!     // The bulk variant leaves the virtual indexes in place.
//!     let _teardown = generator.get_hypo_reset_sql();
//!     Ok(())
//! }
//! ```

pub mod advise;
pub mod catalog;
pub mod config;
pub mod error;
pub mod explain;
pub mod hypo;
pub mod ident;
pub mod placeholder;
pub mod prepared;

// Re-export commonly used types
pub use config::GeneratorConfig;
pub use error::{AdvisorError, Result};
pub use hypo::{HypoIndexOrigin, HypoIndexRegistry, IndexCandidate, IndexCheckCommands};
pub use ident::TrustedIdent;
pub use placeholder::NormalizedStatement;
pub use prepared::{PreparedStatementCache, PreparedStatementEntry};

use std::sync::Arc;

/// Entry point for command generation.
///
/// A generator owns the identifier counter and the prepared-statement cache,
/// so create one per advisor run and use it for every command list sent to
/// the same database session. All methods take `&self`; the cache serializes
/// identifier allocation internally.
#[derive(Debug)]
pub struct CommandGenerator {
    config: GeneratorConfig,
    cache: PreparedStatementCache,
}

impl CommandGenerator {
    /// Create a generator with the default configuration.
    pub fn new() -> Self {
        let config = GeneratorConfig::default();
        Self {
            cache: PreparedStatementCache::new(config.prepare_prefix.clone(), config.start_id),
            config,
        }
    }

    /// Create a generator with a custom configuration.
    pub fn with_config(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: PreparedStatementCache::new(config.prepare_prefix.clone(), config.start_id),
            config,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// `[prepare, explain, deallocate]` for one statement.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hypocost::CommandGenerator;
    ///
    /// let generator = CommandGenerator::new();
    /// let sqls = generator.get_prepare_sqls("SELECT * FROM t WHERE id = $1").unwrap();
    /// assert_eq!(sqls, vec![
    ///     "prepare prepare_0 as SELECT * FROM t WHERE id = $1",
    ///     "explain execute prepare_0(NULL)",
    ///     "deallocate prepare prepare_0",
    /// ]);
    /// ```
    pub fn get_prepare_sqls(&self, statement: &str) -> Result<Vec<String>> {
        Ok(self.cache.get_prepare_sqls(statement)?.to_vec())
    }

    /// The cached entry behind [`get_prepare_sqls`](Self::get_prepare_sqls).
    pub fn prepared_entry(&self, statement: &str) -> Result<Arc<PreparedStatementEntry>> {
        self.cache.get_prepare_sqls(statement)
    }

    /// Commands costing a whole workload. See [`hypo::workload_cost_sqls`].
    ///
    /// The hypothetical indexes stay alive afterwards: run
    /// [`get_hypo_reset_sql`](Self::get_hypo_reset_sql) or drop the session.
    pub fn get_workload_cost_sqls<S: AsRef<str>>(
        &self,
        statements: &[S],
        indexes: &[IndexCandidate],
        multi_node: bool,
    ) -> Result<Vec<String>> {
        hypo::workload_cost_sqls(
            &self.cache,
            &self.config.hypo_extension,
            statements,
            indexes,
            multi_node,
        )
    }

    /// Self-contained commands for one query plus the candidate registry.
    /// See [`hypo::index_check_sqls`].
    pub fn get_index_check_sqls(
        &self,
        query: &str,
        indexes: &[IndexCandidate],
        multi_node: bool,
    ) -> Result<IndexCheckCommands> {
        hypo::index_check_sqls(
            &self.cache,
            &self.config.hypo_extension,
            query,
            indexes,
            multi_node,
        )
    }

    /// Only the virtual-schema preamble, without any statement.
    pub fn get_index_setting_sqls(&self, indexes: &[IndexCandidate], multi_node: bool) -> Vec<String> {
        hypo::index_setting_sqls(&self.config.hypo_extension, indexes, multi_node)
    }

    pub fn get_hypo_reset_sql(&self) -> String {
        hypo::hypo_reset_sql()
    }

    /// Built-in advisor call with `raw_sql` as an escaped literal.
    pub fn get_single_advisor_sql(&self, raw_sql: &str) -> String {
        advise::single_advisor_sql_with(&self.config.index_advise_function, raw_sql)
    }

    /// Forget memoized statements. Identifiers are not reused afterwards.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_statements(&self) -> usize {
        self.cache.len()
    }

    /// The counter value the next new statement will receive.
    pub fn next_id(&self) -> u64 {
        self.cache.next_id()
    }
}

impl Default for CommandGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandGenerator>();
    }

    #[test]
    fn test_with_config_validates() {
        let bad = GeneratorConfig::new().with_hypo_extension("x'");
        assert!(CommandGenerator::with_config(bad).is_err());
    }

    #[test]
    fn test_config_flows_into_commands() {
        let generator = CommandGenerator::with_config(
            GeneratorConfig::new()
                .with_prepare_prefix("wl_")
                .with_hypo_extension("hypo_ext")
                .with_index_advise_function("adv")
                .with_start_id(5),
        )
        .unwrap();
        let idx = IndexCandidate::parse("t", &["a"]).unwrap();
        let sqls = generator
            .get_workload_cost_sqls(&["SELECT 1"], &[idx], false)
            .unwrap();
        assert_eq!(sqls[0], "LOAD 'hypo_ext';");
        assert_eq!(sqls[2], "prepare wl_5 as SELECT 1");
        assert_eq!(generator.get_single_advisor_sql("x"), "select adv('x');");
    }
}
