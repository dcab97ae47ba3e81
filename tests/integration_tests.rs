//! Integration tests for hypocost
//!
//! These tests drive the public `CommandGenerator` the way an index advisor
//! does: build command lists, hand them to a (simulated) session, and map the
//! results back.

use proptest::prelude::*;

use hypocost::catalog::{get_existing_index_sql, get_table_info_sql};
use hypocost::explain::workload_costs;
use hypocost::hypo::MULTI_NODE_FLAGS;
use hypocost::{AdvisorError, CommandGenerator, IndexCandidate, TrustedIdent};

fn candidates() -> Vec<IndexCandidate> {
    vec![
        IndexCandidate::parse("public.orders", &["customer_id"]).unwrap(),
        IndexCandidate::parse("public.orders", &["status", "created_at"])
            .unwrap()
            .with_index_type("LOCAL")
            .unwrap(),
    ]
}

fn is_statement_command(sql: &str) -> bool {
    sql.starts_with("prepare ") || sql.starts_with("explain execute ")
}

// ============================================================================
// Documented examples
// ============================================================================

#[test]
fn test_prepare_example() {
    let generator = CommandGenerator::new();
    let sqls = generator
        .get_prepare_sqls("SELECT * FROM t WHERE id = $1")
        .unwrap();
    assert_eq!(
        sqls,
        vec![
            "prepare prepare_0 as SELECT * FROM t WHERE id = $1",
            "explain execute prepare_0(NULL)",
            "deallocate prepare prepare_0",
        ]
    );
}

#[test]
fn test_single_advisor_example() {
    let generator = CommandGenerator::new();
    assert_eq!(
        generator.get_single_advisor_sql("SELECT * FROM t WHERE name = 'a'"),
        "select pg_catalog.gs_index_advise('SELECT * FROM t WHERE name = ''a''');"
    );
}

#[test]
fn test_multi_node_without_indexes() {
    let generator = CommandGenerator::new();
    let sqls = generator
        .get_workload_cost_sqls(&["SELECT 1"], &[], true)
        .unwrap();
    assert_eq!(&sqls[..2], &MULTI_NODE_FLAGS.map(String::from)[..]);
    assert!(!sqls.iter().any(|s| s.starts_with("LOAD")));
    assert!(!sqls.iter().any(|s| s.contains("hypopg_create_index")));
    assert_eq!(sqls.len(), 5);
}

// ============================================================================
// Workload evaluation
// ============================================================================

#[test]
fn test_workload_full_sequence() {
    let generator = CommandGenerator::new();
    let workload = [
        "SELECT * FROM orders WHERE customer_id = ?",
        "SELECT count(*) FROM orders WHERE status = $1 AND created_at > $2",
    ];
    let sqls = generator
        .get_workload_cost_sqls(&workload, &candidates(), true)
        .unwrap();

    assert_eq!(
        sqls,
        vec![
            "LOAD 'hypopg';",
            "SELECT pg_catalog.hypopg_create_index('CREATE INDEX ON public.orders(customer_id)');",
            "SELECT pg_catalog.hypopg_create_index('CREATE INDEX ON public.orders(status, created_at) LOCAL');",
            "set enable_fast_query_shipping = off;",
            "set enable_stream_operator = on;",
            "prepare prepare_0 as SELECT * FROM orders WHERE customer_id = $1",
            "explain execute prepare_0(NULL)",
            "deallocate prepare prepare_0",
            "prepare prepare_1 as SELECT count(*) FROM orders WHERE status = $1 AND created_at > $2",
            "explain execute prepare_1(NULL,NULL)",
            "deallocate prepare prepare_1",
        ]
    );
}

#[test]
fn test_workload_duplicates_reuse_identifier() {
    let generator = CommandGenerator::new();
    let workload = ["SELECT 1", "SELECT 2", "SELECT 1"];
    let sqls = generator.get_workload_cost_sqls(&workload, &[], false).unwrap();

    assert_eq!(sqls.len(), 9);
    assert_eq!(sqls[0], sqls[6]);
    assert_eq!(sqls[1], sqls[7]);
    assert_eq!(generator.cached_statements(), 2);
    assert_eq!(generator.next_id(), 2);
}

#[test]
fn test_workload_across_calls_shares_identifiers() {
    let generator = CommandGenerator::new();
    let first = generator
        .get_workload_cost_sqls(&["SELECT a FROM t"], &candidates(), false)
        .unwrap();
    let second = generator
        .get_workload_cost_sqls(&["SELECT a FROM t", "SELECT b FROM t"], &[], false)
        .unwrap();

    assert!(first.contains(&"prepare prepare_0 as SELECT a FROM t".to_string()));
    assert_eq!(second[0], "prepare prepare_0 as SELECT a FROM t");
    assert_eq!(second[3], "prepare prepare_1 as SELECT b FROM t");
}

#[test]
fn test_workload_error_reports_position() {
    let generator = CommandGenerator::new();
    let workload = vec![
        "SELECT 1".to_string(),
        "SELECT * FROM t WHERE a = $1 AND b = $3".to_string(),
    ];
    let err = generator
        .get_workload_cost_sqls(workload.as_slice(), &[], false)
        .unwrap_err();

    match &err {
        AdvisorError::Workload { index, source } => {
            assert_eq!(*index, 1);
            assert!(matches!(**source, AdvisorError::MalformedStatement { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.statement(), Some("SELECT * FROM t WHERE a = $1 AND b = $3"));
}

#[test]
fn test_clause_parentheses_keep_their_parameters() {
    let generator = CommandGenerator::new();
    let workload = [
        "SELECT count(*) FILTER (WHERE status = ?) FROM orders",
        "SELECT * FROM bookings WHERE (starts, ends) OVERLAPS (?, ?)",
        "SELECT * FROM users WHERE name SIMILAR TO (?)",
        "SELECT * FROM orders ORDER BY id FETCH FIRST (?) ROWS ONLY",
    ];
    let sqls = generator.get_workload_cost_sqls(&workload, &[], false).unwrap();
    let explains: Vec<&str> = sqls
        .iter()
        .filter(|s| s.starts_with("explain"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        explains,
        vec![
            "explain execute prepare_0(NULL)",
            "explain execute prepare_1(NULL,NULL)",
            "explain execute prepare_2(NULL)",
            "explain execute prepare_3(NULL)",
        ]
    );
    assert_eq!(
        sqls[0],
        "prepare prepare_0 as SELECT count(*) FILTER (WHERE status = $1) FROM orders"
    );
}

#[test]
fn test_call_arguments_neutralized_in_workload() {
    let generator = CommandGenerator::new();
    let sqls = generator
        .get_prepare_sqls("SELECT * FROM t WHERE substr(name, ?, ?) = ? AND round(price, ?) > ?")
        .unwrap();
    assert_eq!(
        sqls[0],
        "prepare prepare_0 as SELECT * FROM t WHERE substr(name, NULL, NULL) = $1 AND round(price, NULL) > $2"
    );
    assert_eq!(sqls[1], "explain execute prepare_0(NULL,NULL)");
}

#[test]
fn test_clear_cache_keeps_counter() {
    let generator = CommandGenerator::new();
    generator.get_prepare_sqls("SELECT 1").unwrap();
    generator.clear_cache();
    assert_eq!(generator.cached_statements(), 0);
    let sqls = generator.get_prepare_sqls("SELECT 1").unwrap();
    assert_eq!(sqls[0], "prepare prepare_1 as SELECT 1");
}

// ============================================================================
// Single-query check
// ============================================================================

#[test]
fn test_index_check_sequence_and_registry() {
    let generator = CommandGenerator::new();
    let check = generator
        .get_index_check_sqls(
            "SELECT * FROM orders WHERE status = ? ORDER BY created_at",
            &candidates(),
            false,
        )
        .unwrap();

    assert_eq!(check.commands.first().unwrap(), "LOAD 'hypopg';");
    assert_eq!(
        check.commands.last().unwrap(),
        "SELECT pg_catalog.hypopg_reset_index();"
    );
    assert_eq!(
        check.commands[3],
        "prepare prepare_0 as SELECT * FROM orders WHERE status = $1 ORDER BY created_at"
    );

    let registry = &check.registry;
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.columns_by_key().get("orders_status_created_at").unwrap(),
        "status, created_at"
    );
    assert_eq!(
        registry.tables_by_key().get("orders_customer_id").unwrap(),
        "orders"
    );

    // The engine reports hypothetical indexes as <oid>btree_<table>_<cols>.
    let origin = registry.resolve("<16401>btree_orders_status_created_at").unwrap();
    assert_eq!(origin.columns, "status, created_at");

    // a short name that is only a prefix of a key was not cut by the engine
    assert!(registry.resolve("<16401>btree_orders_status").is_none());
}

#[test]
fn test_index_check_collapsed_keys_first_wins() {
    let generator = CommandGenerator::new();
    let indexes = vec![
        IndexCandidate::parse("s1.t", &["a"]).unwrap(),
        IndexCandidate::parse("s2.t", &["a"]).unwrap(),
    ];
    let check = generator.get_index_check_sqls("SELECT 1", &indexes, false).unwrap();
    let (columns, tables) = check.registry.into_maps();
    assert_eq!(columns.len(), 1);
    assert_eq!(tables.get("t_a").unwrap(), "t");
    // both candidates are still simulated
    assert_eq!(
        check
            .commands
            .iter()
            .filter(|c| c.contains("hypopg_create_index"))
            .count(),
        2
    );
}

#[test]
fn test_setting_sqls_and_reset() {
    let generator = CommandGenerator::new();
    let sqls = generator.get_index_setting_sqls(&candidates(), false);
    assert_eq!(sqls.len(), 3);
    assert!(!sqls.iter().any(|s| is_statement_command(s)));
    assert_eq!(
        generator.get_hypo_reset_sql(),
        "SELECT pg_catalog.hypopg_reset_index();"
    );
}

// ============================================================================
// Catalog + results
// ============================================================================

#[test]
fn test_catalog_queries_with_trusted_identifiers() {
    let schema = TrustedIdent::new("public").unwrap();
    let tables = [TrustedIdent::new("orders").unwrap()];
    assert!(get_existing_index_sql(&schema, &tables).contains("c.relname in ('orders')"));
    assert!(get_table_info_sql(&tables[0], &schema).contains("relname ilike 'orders'"));
    assert!(TrustedIdent::new("orders' OR '1'='1").is_err());
}

#[test]
fn test_quotes_cannot_reach_generated_literals() {
    assert!(TrustedIdent::new("\"x'); DROP TABLE users; --\"").is_err());
    assert!(IndexCandidate::parse("\"x'); DROP TABLE users; --\"", &["a"]).is_err());
    assert!(IndexCandidate::parse("t", &["a"])
        .unwrap()
        .with_index_type("LOCAL'); DROP TABLE users; --")
        .is_err());
}

#[test]
fn test_costs_line_up_with_workload() {
    let generator = CommandGenerator::new();
    let workload = ["SELECT * FROM a WHERE x = ?", "SELECT * FROM b"];
    let sqls = generator.get_workload_cost_sqls(&workload, &[], false).unwrap();
    let explains: Vec<&String> = sqls.iter().filter(|s| s.starts_with("explain")).collect();
    assert_eq!(explains.len(), workload.len());

    // What a session returns for those two explains, concatenated.
    let rows = [
        "Index Scan using <1>btree_a_x on a  (cost=0.00..8.27 rows=1 width=8)",
        "  Index Cond: (x = $1)",
        "Seq Scan on b  (cost=0.00..31.40 rows=2140 width=8)",
    ];
    assert_eq!(workload_costs(&rows), vec![8.27, 31.40]);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_null_count_matches_markers(k in 0usize..24) {
        let statement = if k == 0 {
            "SELECT * FROM t".to_string()
        } else {
            let preds: Vec<String> = (1..=k).map(|i| format!("c{} = ?", i)).collect();
            format!("SELECT * FROM t WHERE {}", preds.join(" AND "))
        };
        let generator = CommandGenerator::new();
        let sqls = generator.get_prepare_sqls(&statement).unwrap();
        let explain = &sqls[1];
        if k == 0 {
            prop_assert_eq!(explain.as_str(), "explain execute prepare_0");
        } else {
            let args = explain
                .strip_prefix("explain execute prepare_0(")
                .and_then(|s| s.strip_suffix(')'))
                .unwrap();
            let nulls: Vec<&str> = args.split(',').collect();
            prop_assert_eq!(nulls.len(), k);
            prop_assert!(nulls.iter().all(|n| *n == "NULL"));
        }
    }

    #[test]
    fn prop_repeat_is_identical_and_free(statement in "[a-z =?,<>]{0,40}") {
        let generator = CommandGenerator::new();
        let first = generator.get_prepare_sqls(&statement).unwrap();
        let next = generator.next_id();
        let second = generator.get_prepare_sqls(&statement).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(generator.next_id(), next);
    }

    #[test]
    fn prop_identifiers_strictly_increase(
        statements in prop::collection::hash_set("SELECT [a-z]{1,10} FROM t", 1..40)
    ) {
        let generator = CommandGenerator::new();
        let ids: Vec<u64> = statements
            .iter()
            .map(|s| generator.prepared_entry(s).unwrap().id())
            .collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(ids.len(), statements.len());
    }

    #[test]
    fn prop_quotes_are_doubled(raw in ".*") {
        let sql = hypocost::advise::get_single_advisor_sql(&raw);
        let prefix = "select pg_catalog.gs_index_advise('";
        let suffix = "');";
        prop_assert!(sql.starts_with(prefix));
        prop_assert!(sql.ends_with(suffix));
        let literal = &sql[prefix.len()..sql.len() - suffix.len()];
        let k = raw.matches('\'').count();
        prop_assert_eq!(literal.matches('\'').count(), 2 * k);
        prop_assert!(!literal.replace("''", "").contains('\''));
    }

    #[test]
    fn prop_index_creation_precedes_statements(
        n_indexes in 1usize..6,
        multi_node in any::<bool>(),
    ) {
        let indexes: Vec<IndexCandidate> = (0..n_indexes)
            .map(|i| IndexCandidate::parse("t", &[format!("c{}", i).as_str()]).unwrap())
            .collect();
        let generator = CommandGenerator::new();
        let sqls = generator
            .get_workload_cost_sqls(&["SELECT 1", "SELECT 2"], &indexes, multi_node)
            .unwrap();
        let last_create = sqls.iter().rposition(|s| s.contains("hypopg_create_index")).unwrap();
        let first_stmt = sqls.iter().position(|s| is_statement_command(s)).unwrap();
        prop_assert_eq!(sqls[0].as_str(), "LOAD 'hypopg';");
        prop_assert!(last_create < first_stmt);
        if multi_node {
            let flags = sqls.iter().position(|s| s.starts_with("set ")).unwrap();
            prop_assert!(flags < first_stmt);
        }
    }
}
