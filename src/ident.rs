//! Trusted SQL identifiers.
//!
//! Catalog queries and hypothetical-index calls interpolate table, schema and
//! column names directly into SQL text without quoting. [`TrustedIdent`] marks
//! a string as safe for that: either it passed [`TrustedIdent::new`], or the
//! caller vouched for it with [`TrustedIdent::trusted`]. Rendering never
//! alters the text, so generated commands are byte-identical to plain string
//! interpolation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// A possibly schema-qualified identifier that may be embedded in SQL as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrustedIdent(String);

impl TrustedIdent {
    /// Validate and wrap an identifier.
    ///
    /// Accepts dot-separated parts, each either an unquoted identifier
    /// (`[A-Za-z_][A-Za-z0-9_$]*`, unicode letters allowed) or a double-quoted
    /// identifier with `""` as the escaped quote. A quoted part may not
    /// contain `'`, since catalog queries and hypothetical-index calls embed
    /// names inside string literals.
    pub fn new(ident: impl Into<String>) -> Result<Self> {
        let ident = ident.into();
        match validate(&ident) {
            Ok(()) => Ok(Self(ident)),
            Err(reason) => Err(AdvisorError::invalid_identifier(ident, reason)),
        }
    }

    /// Wrap an identifier the caller has already validated.
    pub fn trusted(ident: impl Into<String>) -> Self {
        Self(ident.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last dot-separated part, e.g. `orders` for `public.orders`.
    pub fn bare_name(&self) -> &str {
        let mut in_quotes = false;
        let mut start = 0;
        for (i, c) in self.0.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                '.' if !in_quotes => start = i + 1,
                _ => {}
            }
        }
        &self.0[start..]
    }
}

impl fmt::Display for TrustedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrustedIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrustedIdent {
    type Error = AdvisorError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for TrustedIdent {
    type Error = AdvisorError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TrustedIdent> for String {
    fn from(ident: TrustedIdent) -> Self {
        ident.0
    }
}

fn validate(ident: &str) -> std::result::Result<(), &'static str> {
    if ident.is_empty() {
        return Err("identifier is empty");
    }

    let mut chars = ident.chars().peekable();
    loop {
        match chars.peek().copied() {
            Some('"') => {
                chars.next();
                let mut empty = true;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            empty = false;
                        }
                        Some('"') => break,
                        // names end up inside '...' literals
                        Some('\'') => return Err("single quote inside quoted identifier"),
                        Some(_) => empty = false,
                        None => return Err("unterminated quoted identifier"),
                    }
                }
                if empty {
                    return Err("zero-length quoted identifier");
                }
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            Some(_) => return Err("identifier part must start with a letter or underscore"),
            None => return Err("empty identifier part"),
        }

        match chars.next() {
            None => return Ok(()),
            Some('.') => {}
            Some(_) => return Err("unexpected character in identifier"),
        }
    }
}
