//! Generator configuration.

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::ident::TrustedIdent;

/// Configuration for a [`CommandGenerator`](crate::CommandGenerator).
///
/// The defaults reproduce the command text the openGauss `hypopg` extension
/// and `gs_index_advise` expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Prefix of every prepared-statement identifier
    pub prepare_prefix: String,
    /// Extension loaded before any hypothetical index is created
    pub hypo_extension: String,
    /// Function called by the single-statement advisor
    pub index_advise_function: String,
    /// First value handed out by the identifier counter
    pub start_id: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            prepare_prefix: "prepare_".to_string(),
            hypo_extension: "hypopg".to_string(),
            index_advise_function: "pg_catalog.gs_index_advise".to_string(),
            start_id: 0,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_prepare_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prepare_prefix = prefix.into();
        self
    }

    pub fn with_hypo_extension(mut self, extension: impl Into<String>) -> Self {
        self.hypo_extension = extension.into();
        self
    }

    pub fn with_index_advise_function(mut self, function: impl Into<String>) -> Self {
        self.index_advise_function = function.into();
        self
    }

    pub fn with_start_id(mut self, start_id: u64) -> Self {
        self.start_id = start_id;
        self
    }

    /// Check that every name interpolated into generated SQL is a plain identifier.
    pub fn validate(&self) -> Result<()> {
        // The prefix is glued to the counter value, so it must be one bare name.
        if self.prepare_prefix.contains('.') {
            return Err(AdvisorError::config(format!(
                "prepare_prefix '{}' must not be schema-qualified",
                self.prepare_prefix
            )));
        }
        check_ident("prepare_prefix", &self.prepare_prefix)?;
        check_ident("hypo_extension", &self.hypo_extension)?;
        check_ident("index_advise_function", &self.index_advise_function)?;
        Ok(())
    }
}

fn check_ident(field: &str, value: &str) -> Result<()> {
    TrustedIdent::new(value)
        .map(|_| ())
        .map_err(|e| AdvisorError::config(format!("{}: {}", field, e)))
}
