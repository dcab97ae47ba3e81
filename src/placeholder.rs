//! Placeholder normalization for workload statements.
//!
//! Workload statements arrive in whatever form the statement collector
//! captured them: with PostgreSQL positional markers (`$1`, `$2`), with
//! anonymous `?` markers left behind by literal stripping, or with a mix of
//! both. `PREPARE` only understands positional markers, so this module
//! rewrites a statement into that form and reports how many parameters the
//! prepared statement will take.
//!
//! Markers are found with the `sqlparser` tokenizer, so markers inside
//! string literals, quoted identifiers, dollar-quoted bodies and comments are
//! never touched. Only the marker spans are spliced; every other byte of the
//! input is copied unchanged.
//!
//! - an anonymous marker that is itself an argument of a function call is
//!   replaced with `NULL`, so argument commas never turn into extra
//!   parameters and the planner is not asked to infer a parameter type from
//!   an overloaded signature. Call arguments are read from the parsed
//!   statement, so parentheses after `FILTER`, `OVERLAPS`, `SIMILAR TO` or
//!   `FETCH FIRST` are not mistaken for argument lists;
//! - every other anonymous marker becomes `$n`, numbered after the highest
//!   positional marker already present.
//!
//! A statement the parser does not understand (engine-specific syntax) is
//! still normalized, with every anonymous marker numbered.
//!
//! Normalizing an already normalized statement is a no-op.
//!
//! # Example
//!
//! ```rust
//! use hypocost::placeholder::normalize_placeholders;
//!
//! let normalized =
//!     normalize_placeholders("SELECT * FROM t WHERE substr(name, ?, ?) = ? AND id = $1").unwrap();
//! assert_eq!(
//!     normalized.text(),
//!     "SELECT * FROM t WHERE substr(name, NULL, NULL) = $2 AND id = $1"
//! );
//! assert_eq!(normalized.parameter_count(), 2);
//! ```

use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;

use sqlparser::ast::{self as sql_ast, visit_expressions};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::{Location, Token, Tokenizer};
use tracing::debug;

use crate::error::{AdvisorError, Result};

/// Literal substituted for anonymous markers inside function-call arguments.
const NEUTRAL_ARGUMENT: &str = "NULL";

/// A statement rewritten to use positional parameter markers only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedStatement {
    text: String,
    parameter_count: usize,
    numbered: usize,
    neutralized: usize,
}

impl NormalizedStatement {
    /// Statement text with positional markers only.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Number of distinct positional markers (`$1..=$n`) in [`text`](Self::text).
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Anonymous markers that were turned into positional ones.
    pub fn numbered_markers(&self) -> usize {
        self.numbered
    }

    /// Anonymous markers inside function-call arguments replaced with `NULL`.
    pub fn neutralized_markers(&self) -> usize {
        self.neutralized
    }

    /// Whether the text differs from the input.
    pub fn is_rewritten(&self) -> bool {
        self.numbered + self.neutralized > 0
    }
}

/// Returns true if the statement contains at least one `$n` marker outside
/// literals and comments. Statements that fail to tokenize report `false`.
pub fn has_dollar_placeholder(statement: &str) -> bool {
    scan(statement)
        .map(|markers| {
            markers
                .iter()
                .any(|m| matches!(m.kind, MarkerKind::Positional(_)))
        })
        .unwrap_or(false)
}

/// Rewrite anonymous `?` markers into positional form and count parameters.
///
/// Fails with [`AdvisorError::MalformedStatement`] when the statement has an
/// unterminated literal or comment, unbalanced parentheses, a `$0` marker, a
/// marker number that overflows, or positional markers with gaps (`$1`, `$3`
/// without `$2`): the `NULL` argument list generated from the count would not
/// match what the engine expects.
pub fn normalize_placeholders(statement: &str) -> Result<NormalizedStatement> {
    let markers = scan(statement).map_err(|reason| AdvisorError::malformed(statement, reason))?;

    let positional: BTreeSet<usize> = markers
        .iter()
        .filter_map(|m| match m.kind {
            MarkerKind::Positional(n) => Some(n),
            MarkerKind::Anonymous => None,
        })
        .collect();
    let highest = positional.iter().next_back().copied().unwrap_or(0);
    if highest != positional.len() {
        let missing = (1..=highest)
            .find(|n| !positional.contains(n))
            .unwrap_or(highest);
        return Err(AdvisorError::malformed(
            statement,
            format!("positional marker ${} is missing", missing),
        ));
    }

    let anonymous: Vec<&Marker> = markers
        .iter()
        .filter(|m| m.kind == MarkerKind::Anonymous)
        .collect();
    if anonymous.is_empty() {
        return Ok(NormalizedStatement {
            text: statement.to_string(),
            parameter_count: highest,
            numbered: 0,
            neutralized: 0,
        });
    }

    let in_call = call_argument_markers(statement, &anonymous, highest + 1);

    let mut text = String::with_capacity(statement.len() + anonymous.len() * 2);
    let mut copied = 0;
    let mut next = highest;
    let mut numbered = 0;
    let mut neutralized = 0;
    for (slot, marker) in anonymous.iter().enumerate() {
        text.push_str(&statement[copied..marker.start]);
        if in_call.contains(&slot) {
            text.push_str(NEUTRAL_ARGUMENT);
            neutralized += 1;
        } else {
            next += 1;
            numbered += 1;
            text.push('$');
            text.push_str(&next.to_string());
        }
        copied = marker.end;
    }
    text.push_str(&statement[copied..]);

    Ok(NormalizedStatement {
        text,
        parameter_count: next,
        numbered,
        neutralized,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Positional(usize),
    Anonymous,
}

/// A marker token and its byte span in the statement.
#[derive(Debug, Clone, Copy)]
struct Marker {
    kind: MarkerKind,
    start: usize,
    end: usize,
}

/// Tokenize `sql` and locate its parameter markers.
///
/// The PostgreSQL dialect keeps `?|` and `?&` as operator tokens and treats
/// `col$1` as one identifier, so neither yields a marker.
fn scan(sql: &str) -> std::result::Result<Vec<Marker>, String> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| e.to_string())?;
    let lines = LineIndex::new(sql);

    let mut markers = Vec::new();
    let mut depth = 0usize;
    for token in &tokens {
        let location = token.span.start;
        let (kind, source) = match &token.token {
            Token::LParen => {
                depth += 1;
                continue;
            }
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    format!(
                        "unbalanced ')' at line {}, column {}",
                        location.line, location.column
                    )
                })?;
                continue;
            }
            Token::Question => (MarkerKind::Anonymous, "?"),
            Token::Placeholder(p) if p == "?" => (MarkerKind::Anonymous, "?"),
            Token::Placeholder(p) => match positional_number(p)? {
                Some(n) => (MarkerKind::Positional(n), p.as_str()),
                None => continue,
            },
            _ => continue,
        };

        let start = lines
            .offset(location)
            .filter(|&start| sql.get(start..start + source.len()) == Some(source))
            .ok_or_else(|| {
                format!(
                    "marker {} not found at line {}, column {}",
                    source, location.line, location.column
                )
            })?;
        markers.push(Marker {
            kind,
            start,
            end: start + source.len(),
        });
    }

    if depth > 0 {
        return Err(format!("{} unclosed '('", depth));
    }
    Ok(markers)
}

/// `Some(n)` for a `$n` placeholder token, `None` for other placeholder forms.
fn positional_number(placeholder: &str) -> std::result::Result<Option<usize>, String> {
    let digits = match placeholder.strip_prefix('$') {
        Some(d) if !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()) => d,
        _ => return Ok(None),
    };
    let n: usize = digits
        .parse()
        .map_err(|_| format!("positional marker ${} is out of range", digits))?;
    if n == 0 {
        return Err("positional markers start at $1, found $0".to_string());
    }
    Ok(Some(n))
}

/// Indexes into `anonymous` of the markers that are direct arguments of a
/// function call.
///
/// Each anonymous marker is given a unique positional number starting at
/// `first_slot` so the statement parses, then the call arguments of the AST
/// are matched back to those numbers. A statement that does not parse has no
/// call arguments.
fn call_argument_markers(sql: &str, anonymous: &[&Marker], first_slot: usize) -> HashSet<usize> {
    let mut text = String::with_capacity(sql.len() + anonymous.len() * 4);
    let mut copied = 0;
    for (i, marker) in anonymous.iter().enumerate() {
        text.push_str(&sql[copied..marker.start]);
        text.push('$');
        text.push_str(&(first_slot + i).to_string());
        copied = marker.end;
    }
    text.push_str(&sql[copied..]);

    let statements = match SqlParser::parse_sql(&PostgreSqlDialect {}, &text) {
        Ok(statements) => statements,
        Err(err) => {
            debug!(error = %err, "statement not parsed, numbering every anonymous marker");
            return HashSet::new();
        }
    };

    let mut in_call = HashSet::new();
    let mut record = |expr: &sql_ast::Expr| {
        if let Some(slot) = placeholder_slot(expr) {
            if slot >= first_slot && slot - first_slot < anonymous.len() {
                in_call.insert(slot - first_slot);
            }
        }
    };
    let _ = visit_expressions(&statements, |expr| {
        match expr {
            sql_ast::Expr::Function(func) => {
                if let sql_ast::FunctionArguments::List(list) = &func.args {
                    for arg in &list.args {
                        match arg {
                            sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e))
                            | sql_ast::FunctionArg::Named {
                                arg: sql_ast::FunctionArgExpr::Expr(e),
                                ..
                            }
                            | sql_ast::FunctionArg::ExprNamed {
                                arg: sql_ast::FunctionArgExpr::Expr(e),
                                ..
                            } => record(e),
                            _ => {}
                        }
                    }
                }
            }
            // substr(a, b, c) and substring(a FROM b FOR c) get their own node
            sql_ast::Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                record(&**expr);
                for e in [substring_from, substring_for].into_iter().flatten() {
                    record(&**e);
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });
    in_call
}

fn placeholder_slot(expr: &sql_ast::Expr) -> Option<usize> {
    match expr {
        sql_ast::Expr::Value(v) => match &v.value {
            sql_ast::Value::Placeholder(p) => p.strip_prefix('$')?.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

/// Maps tokenizer locations (1-based line, 1-based char column, lines split
/// on `\n`) to byte offsets.
struct LineIndex<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(sql: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { sql, starts }
    }

    fn offset(&self, location: Location) -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let line_start = *self.starts.get(line)?;
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| line_start + i)
    }
}
