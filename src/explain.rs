//! Reading costs back out of `EXPLAIN` output.
//!
//! The session layer returns the plan text of each `explain execute` as
//! rows. These helpers pull the planner's total cost estimate out of them so
//! costs can be lined up with the workload statements that produced them.

use std::sync::OnceLock;

use regex::Regex;

fn cost_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"cost=(?P<startup>\d+(?:\.\d+)?)\.\.(?P<total>\d+(?:\.\d+)?)")
            .expect("static regex is valid")
    })
}

/// Total cost from a plan line such as
/// `Index Scan using t_a_idx on t  (cost=0.29..8.30 rows=1 width=4)`.
pub fn parse_total_cost(plan_line: &str) -> Option<f64> {
    cost_pattern()
        .captures(plan_line)?
        .name("total")?
        .as_str()
        .parse()
        .ok()
}

/// Startup cost from a plan line.
pub fn parse_startup_cost(plan_line: &str) -> Option<f64> {
    cost_pattern()
        .captures(plan_line)?
        .name("startup")?
        .as_str()
        .parse()
        .ok()
}

/// Top-level cost of each plan in concatenated `EXPLAIN` output.
///
/// A plan's root line starts in column zero; child nodes are indented or
/// start with `->`. Lines without a cost annotation are skipped.
pub fn workload_costs<S: AsRef<str>>(plan_lines: &[S]) -> Vec<f64> {
    plan_lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| is_root_line(line))
        .filter_map(parse_total_cost)
        .collect()
}

fn is_root_line(line: &str) -> bool {
    !line.starts_with(char::is_whitespace) && !line.starts_with("->")
}
