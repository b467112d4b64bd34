//! Compilation-side behavior: stripping and plan sharing, cache
//! lifecycle, index-driven scan selection, the cost planner's ordering,
//! and plan rendering.

use std::collections::HashMap;

use trellis::{Config, Database, QueryError, TypedValue};

fn explain(db: &Database, query: &str) -> Vec<String> {
    let result = db.execute(&format!("EXPLAIN {query}")).unwrap();
    assert_eq!(result.header(), ["QUERY PLAN".to_owned()]);
    result
        .results()
        .iter()
        .map(|row| match &row[0] {
            TypedValue::String(line) => line.clone(),
            other => panic!("explain produced a {other:?}"),
        })
        .collect()
}

#[test]
fn queries_differing_only_in_literals_share_a_plan() {
    let db = Database::new(Config::default());
    db.execute("RETURN 1").unwrap();
    db.execute("RETURN 2").unwrap();
    assert_eq!(db.interpreter().plan_cache().len(), 1);

    let one = db.execute("RETURN 1").unwrap();
    let two = db.execute("RETURN 2").unwrap();
    assert!(matches!(one.results()[0][0], TypedValue::Int(1)));
    assert!(matches!(two.results()[0][0], TypedValue::Int(2)));
    // Headers still reflect each query's own literals.
    assert_eq!(one.header(), ["1".to_owned()]);
    assert_eq!(two.header(), ["2".to_owned()]);
}

#[test]
fn distinct_structures_get_distinct_entries() {
    let db = Database::new(Config::default());
    db.execute("RETURN 1").unwrap();
    db.execute("RETURN 1, 2").unwrap();
    assert_eq!(db.interpreter().plan_cache().len(), 2);
}

#[test]
fn disabled_cache_compiles_every_time() {
    let db = Database::new(Config::uncached());
    db.execute("RETURN 1").unwrap();
    db.execute("RETURN 1").unwrap();
    assert!(db.interpreter().plan_cache().is_empty());
}

#[test]
fn compile_errors_do_not_populate_the_cache() {
    let db = Database::new(Config::default());
    assert!(matches!(
        db.execute("MATCH (n) RETURN m").unwrap_err(),
        QueryError::Semantic(_)
    ));
    assert!(db.interpreter().plan_cache().is_empty());
}

#[test]
fn index_creation_invalidates_cached_plans() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:Person {id: 1})").unwrap();
    db.execute("MATCH (n:Person) WHERE n.id = 1 RETURN n").unwrap();
    assert!(db.interpreter().plan_cache().len() >= 1);
    db.execute("CREATE INDEX ON :Person(id)").unwrap();
    assert!(db.interpreter().plan_cache().is_empty());
}

#[test]
fn index_backed_scans_are_selected_and_answer_queries() {
    let db = Database::new(Config::default());
    for id in 1..=10 {
        let mut params = HashMap::new();
        params.insert("id".to_owned(), TypedValue::Int(id));
        db.execute_with_params("CREATE (:Person {id: $id})", &params)
            .unwrap();
    }
    db.execute("CREATE INDEX ON :Person(id)").unwrap();

    let plan = explain(&db, "MATCH (n:Person) WHERE n.id = 3 RETURN n");
    assert!(
        plan.iter().any(|line| line.contains("ScanAllByLabelPropertyValue")),
        "plan was {plan:?}"
    );
    let result = db.execute("MATCH (n:Person) WHERE n.id = 3 RETURN n").unwrap();
    assert_eq!(result.results().len(), 1);

    let plan = explain(&db, "MATCH (n:Person) WHERE n.id >= 4 AND n.id < 7 RETURN n");
    assert!(
        plan.iter().any(|line| line.contains("ScanAllByLabelPropertyRange")),
        "plan was {plan:?}"
    );
    let result = db
        .execute("MATCH (n:Person) WHERE n.id >= 4 AND n.id < 7 RETURN n")
        .unwrap();
    assert_eq!(result.results().len(), 3);
}

#[test]
fn index_observes_later_writes() {
    let db = Database::new(Config::default());
    db.execute("CREATE INDEX ON :Person(id)").unwrap();
    db.execute("CREATE (:Person {id: 1})").unwrap();
    let result = db.execute("MATCH (n:Person) WHERE n.id = 1 RETURN n").unwrap();
    assert_eq!(result.results().len(), 1);
    db.execute("MATCH (n:Person) SET n.id = 2").unwrap();
    assert_eq!(
        db.execute("MATCH (n:Person) WHERE n.id = 1 RETURN n")
            .unwrap()
            .results()
            .len(),
        0
    );
    assert_eq!(
        db.execute("MATCH (n:Person) WHERE n.id = 2 RETURN n")
            .unwrap()
            .results()
            .len(),
        1
    );
}

#[test]
fn null_probe_and_open_range_bounds() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:P {v: 1}), (:P {v: 2}), (:P {v: 3})").unwrap();
    db.execute("CREATE INDEX ON :P(v)").unwrap();

    let mut params = HashMap::new();
    params.insert("x".to_owned(), TypedValue::Null);
    // Probing with null matches nothing.
    let result = db
        .execute_with_params("MATCH (n:P) WHERE n.v = $x RETURN n", &params)
        .unwrap();
    assert_eq!(result.results().len(), 0);
    // A null range bound leaves that side open.
    let result = db
        .execute_with_params("MATCH (n:P) WHERE n.v > $x RETURN n", &params)
        .unwrap();
    assert_eq!(result.results().len(), 3);
}

#[test]
fn cost_planner_orders_patterns_by_cardinality() {
    let config = Config::cost_planned();
    let db = Database::new(config);
    db.execute("CREATE (:Big), (:Big), (:Big), (:Big), (:Small)").unwrap();

    // The deepest scan in the rendering is the plan's root.
    let plan = explain(&db, "MATCH (a:Big), (b:Small) RETURN a, b");
    let last_scan = plan
        .iter()
        .rev()
        .find(|line| line.contains("ScanAllByLabel"))
        .unwrap();
    assert!(last_scan.contains(":Small"), "plan was {plan:?}");

    let rule_based = Database::new(Config::default());
    rule_based
        .execute("CREATE (:Big), (:Big), (:Big), (:Big), (:Small)")
        .unwrap();
    let plan = explain(&rule_based, "MATCH (a:Big), (b:Small) RETURN a, b");
    let last_scan = plan
        .iter()
        .rev()
        .find(|line| line.contains("ScanAllByLabel"))
        .unwrap();
    assert!(last_scan.contains(":Big"), "plan was {plan:?}");
}

#[test]
fn cost_planner_roots_a_chain_at_the_cheapest_node() {
    let db = Database::new(Config::cost_planned());
    db.execute("CREATE (:Big)-[:E]->(:Small), (:Big), (:Big), (:Big)").unwrap();
    let plan = explain(&db, "MATCH (a:Big)-[r:E]->(b:Small) RETURN a");
    assert!(
        plan.iter().any(|line| line.contains("ScanAllByLabel (b :Small)")),
        "plan was {plan:?}"
    );
    let result = db.execute("MATCH (a:Big)-[r:E]->(b:Small) RETURN a").unwrap();
    assert_eq!(result.results().len(), 1);
}

#[test]
fn explain_renders_the_operator_tree() {
    let db = Database::new(Config::default());
    let plan = explain(&db, "MATCH (n:L) WHERE n.x = 1 RETURN n ORDER BY n.x LIMIT 3");
    assert_eq!(plan[0], "* Limit");
    assert!(plan.iter().any(|line| line.starts_with("* OrderBy")));
    assert!(plan.iter().any(|line| line.starts_with("* Produce {n}")));
    assert!(plan.iter().any(|line| line.starts_with("* Filter")));
    assert!(plan
        .iter()
        .any(|line| line.starts_with("* ScanAllByLabel (n :L)")));
}

#[test]
fn explain_marks_branching_operators() {
    let db = Database::new(Config::default());
    let plan = explain(&db, "MATCH (n) OPTIONAL MATCH (n)-[r]->(m) RETURN n, r, m");
    let optional_at = plan.iter().position(|line| line == "* Optional").unwrap();
    assert!(plan[optional_at + 1].starts_with("|\\"));
    assert!(plan[optional_at + 2].starts_with(" * Expand"));

    let plan = explain(&db, "MERGE (n:L {v: 1})");
    let merge_at = plan.iter().position(|line| line == "* Merge").unwrap();
    assert_eq!(plan[merge_at + 1], "|\\ On Match");
    assert!(plan.iter().any(|line| line == "|\\ On Create"));
}

#[test]
fn expansion_direction_renders_in_plan() {
    let db = Database::new(Config::default());
    let plan = explain(&db, "MATCH (a)<-[r:E]-(b) RETURN a");
    assert!(
        plan.iter().any(|line| line.contains("(a)<-[r]-(b)")),
        "plan was {plan:?}"
    );
}

#[test]
fn stripped_parameters_keep_user_names_distinct() {
    let db = Database::new(Config::default());
    let mut params = HashMap::new();
    params.insert("a".to_owned(), TypedValue::Int(1));
    params.insert("b".to_owned(), TypedValue::Int(2));
    let result = db
        .execute_with_params("RETURN $a + $b + 10 AS total", &params)
        .unwrap();
    assert!(matches!(result.results()[0][0], TypedValue::Int(13)));
}

#[test]
fn unions_and_foreach_are_rejected_at_planning() {
    let db = Database::new(Config::default());
    assert!(matches!(
        db.execute("RETURN 1 AS x UNION RETURN 2 AS x").unwrap_err(),
        QueryError::Semantic(_)
    ));
    assert!(matches!(
        db.execute("FOREACH (x IN [1] | CREATE (:L {v: x}))").unwrap_err(),
        QueryError::Semantic(_)
    ));
}

#[test]
fn syntax_error_reports_position_and_skips_cache() {
    let db = Database::new(Config::default());
    let err = db.execute("MATCH (n RETURN n").unwrap_err();
    let QueryError::Syntax { line, column, .. } = err else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(line, 1);
    assert!(column > 1);
    assert!(db.interpreter().plan_cache().is_empty());
}

#[test]
fn plan_cache_survives_concurrent_queries() {
    use std::sync::Arc;
    use std::thread;

    let db = Arc::new(Database::new(Config::default()));
    db.execute("CREATE (:T {v: 1}), (:T {v: 2})").unwrap();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                let result = db.execute("MATCH (n:T) RETURN n.v").unwrap();
                assert_eq!(result.results().len(), 2);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.interpreter().plan_cache().len(), 1);
}
