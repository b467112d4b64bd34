//! End-to-end operator semantics that only show up across the whole
//! pipeline: optional-match null propagation into expansions, edge
//! uniqueness with nulls, merge, aggregations, and mutation behavior.

use std::collections::HashMap;

use trellis::{Config, Database, QueryError, TypedValue};

fn rows(db: &Database, query: &str) -> Vec<Vec<TypedValue>> {
    db.execute(query).unwrap().results().to_vec()
}

fn row_count(db: &Database, query: &str) -> usize {
    rows(db, query).len()
}

fn setup_person_dog_food() -> Database {
    let db = Database::new(Config::default());
    db.execute(
        "CREATE (a:Person {id: 1}), (b:Person {id: 2})-[:Has]->(:Dog)-[:Likes]->(:Food)",
    )
    .unwrap();
    db
}

#[test]
fn missing_optional_into_expand() {
    // Expanding from a null produced by a preceding optional match must
    // not exhaust the expansion cursor while its input still has rows.
    let db = setup_person_dog_food();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 4);

    for (desc, edge_pattern) in [
        (false, "-->"),
        (true, "-->"),
        (false, "-[*1]->"),
        (true, "-[*bfs..1]->"),
    ] {
        let query = format!(
            "MATCH (p:Person) WITH p ORDER BY p.id {} OPTIONAL MATCH (p)-->(d:Dog) WITH p, d \
             MATCH (d){}(f:Food) RETURN p, d, f",
            if desc { "DESC" } else { "" },
            edge_pattern,
        );
        assert_eq!(row_count(&db, &query), 1, "pattern {edge_pattern}");
    }
}

#[test]
fn edge_uniqueness_passes_null_edges() {
    let db = Database::new(Config::default());
    db.execute("CREATE (), ()-[:Type]->()").unwrap();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 3);
    assert_eq!(
        row_count(
            &db,
            "MATCH (n) OPTIONAL MATCH (n)-[r1]->(), (n)-[r2]->() RETURN n, r1, r2"
        ),
        3
    );
}

#[test]
fn optional_match_emits_one_null_row_per_empty_branch() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:A), (:A)-[:E]->(:B)").unwrap();
    let result = db
        .execute("MATCH (a:A) OPTIONAL MATCH (a)-[r:E]->(b) RETURN a, r, b")
        .unwrap();
    assert_eq!(result.results().len(), 2);
    let null_rows = result
        .results()
        .iter()
        .filter(|row| row[1].is_null() && row[2].is_null())
        .count();
    assert_eq!(null_rows, 1);
}

#[test]
fn return_literal_with_alias() {
    let db = Database::new(Config::default());
    let result = db.execute("RETURN 1 AS x").unwrap();
    assert_eq!(result.header(), ["x".to_owned()]);
    assert_eq!(result.results().len(), 1);
    assert!(matches!(result.results()[0][0], TypedValue::Int(1)));
}

#[test]
fn header_uses_original_source_text() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:Person {name: 'Ada'})").unwrap();
    let result = db.execute("MATCH (n:Person) RETURN n.name, 2 + 3").unwrap();
    assert_eq!(result.header(), ["n.name".to_owned(), "2 + 3".to_owned()]);
}

#[test]
fn count_skips_nulls() {
    let db = Database::new(Config::default());
    let result = db.execute("UNWIND [1, 2, null, 3] AS x RETURN count(x)").unwrap();
    assert_eq!(result.results().len(), 1);
    assert!(matches!(result.results()[0][0], TypedValue::Int(3)));
}

#[test]
fn merge_creates_once() {
    let db = Database::new(Config::default());
    let first = db.execute("MERGE (p:Person {id: 1})").unwrap();
    assert!(first.results().is_empty());
    let second = db.execute("MERGE (p:Person {id: 1})").unwrap();
    assert!(second.results().is_empty());
    assert_eq!(row_count(&db, "MATCH (p:Person) RETURN p"), 1);
}

#[test]
fn merge_on_create_and_on_match() {
    let db = Database::new(Config::default());
    db.execute("MERGE (p:Person {id: 1}) ON CREATE SET p.created = true ON MATCH SET p.seen = true")
        .unwrap();
    assert_eq!(row_count(&db, "MATCH (p) WHERE p.created = true RETURN p"), 1);
    assert_eq!(row_count(&db, "MATCH (p) WHERE p.seen = true RETURN p"), 0);
    db.execute("MERGE (p:Person {id: 1}) ON CREATE SET p.created = true ON MATCH SET p.seen = true")
        .unwrap();
    assert_eq!(row_count(&db, "MATCH (p) WHERE p.seen = true RETURN p"), 1);
}

#[test]
fn merge_matches_per_input_row() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:L {v: 1}), (:L {v: 2})").unwrap();
    db.execute("MATCH (n:L) MERGE (m:Copy {v: n.v})").unwrap();
    assert_eq!(row_count(&db, "MATCH (m:Copy) RETURN m"), 2);
    // Re-running merges onto the existing vertices.
    db.execute("MATCH (n:L) MERGE (m:Copy {v: n.v})").unwrap();
    assert_eq!(row_count(&db, "MATCH (m:Copy) RETURN m"), 2);
}

#[test]
fn aggregate_empty_input_yields_identity_row() {
    let db = Database::new(Config::default());
    let result = db
        .execute("MATCH (n:Missing) RETURN count(n), sum(n.x), min(n.x), collect(n)")
        .unwrap();
    assert_eq!(result.results().len(), 1);
    let row = &result.results()[0];
    assert!(matches!(row[0], TypedValue::Int(0)));
    assert!(row[1].is_null());
    assert!(row[2].is_null());
    assert!(matches!(&row[3], TypedValue::List(items) if items.is_empty()));
}

#[test]
fn aggregate_groups_by_non_aggregated_items() {
    let db = Database::new(Config::default());
    let result = db
        .execute("UNWIND [1, 1, 2] AS x RETURN x, count(*) ORDER BY x")
        .unwrap();
    let rows = result.results();
    assert_eq!(rows.len(), 2);
    assert!(matches!(rows[0][1], TypedValue::Int(2)));
    assert!(matches!(rows[1][1], TypedValue::Int(1)));
}

#[test]
fn avg_and_distinct_aggregation() {
    let db = Database::new(Config::default());
    let result = db
        .execute("UNWIND [1, 2, 3, 4, 4] AS x RETURN avg(x), count(DISTINCT x)")
        .unwrap();
    let row = &result.results()[0];
    assert!(matches!(row[0], TypedValue::Double(v) if (v - 2.8).abs() < 1e-9));
    assert!(matches!(row[1], TypedValue::Int(4)));
}

#[test]
fn order_by_sorts_nulls_last_ascending_first_descending() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:N {v: 2}), (:N), (:N {v: 1})").unwrap();
    let ascending = rows(&db, "MATCH (n:N) RETURN n.v ORDER BY n.v");
    assert!(matches!(ascending[0][0], TypedValue::Int(1)));
    assert!(matches!(ascending[1][0], TypedValue::Int(2)));
    assert!(ascending[2][0].is_null());
    let descending = rows(&db, "MATCH (n:N) RETURN n.v ORDER BY n.v DESC");
    assert!(descending[0][0].is_null());
    assert!(matches!(descending[1][0], TypedValue::Int(2)));
    assert!(matches!(descending[2][0], TypedValue::Int(1)));
}

#[test]
fn skip_limit_and_distinct() {
    let db = Database::new(Config::default());
    let result = db
        .execute("UNWIND [1, 2, 3, 4] AS x RETURN x ORDER BY x SKIP 1 LIMIT 2")
        .unwrap();
    let values: Vec<_> = result.results().iter().map(|row| row[0].clone()).collect();
    assert!(matches!(values[0], TypedValue::Int(2)));
    assert!(matches!(values[1], TypedValue::Int(3)));
    assert_eq!(values.len(), 2);

    assert_eq!(row_count(&db, "UNWIND [1, 1, 2] AS x RETURN DISTINCT x"), 2);
}

#[test]
fn negative_skip_and_limit_fail() {
    let db = Database::new(Config::default());
    assert!(matches!(
        db.execute("RETURN 1 SKIP -1").unwrap_err(),
        QueryError::Runtime(_)
    ));
    assert!(matches!(
        db.execute("RETURN 1 LIMIT -1").unwrap_err(),
        QueryError::Runtime(_)
    ));
}

#[test]
fn unwind_null_yields_no_rows() {
    let db = Database::new(Config::default());
    assert_eq!(row_count(&db, "UNWIND null AS x RETURN x"), 0);
}

#[test]
fn variable_length_expansion_enumerates_depths() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:C {id: 1})-[:N]->(:C {id: 2})-[:N]->(:C {id: 3})")
        .unwrap();
    assert_eq!(
        row_count(&db, "MATCH (a:C {id: 1})-[*1..2]->(x) RETURN x"),
        2
    );
    assert_eq!(row_count(&db, "MATCH (a:C {id: 1})-[*2..2]->(x) RETURN x"), 1);
    // Depth zero includes the source itself.
    assert_eq!(row_count(&db, "MATCH (a:C {id: 1})-[*0..1]->(x) RETURN x"), 2);
}

#[test]
fn breadth_first_returns_single_shortest_path_per_target() {
    let db = Database::new(Config::default());
    db.execute(
        "CREATE (a:D {id: 1}), (b:D {id: 2}), (c:D {id: 3}), (d:D {id: 4}), \
         (a)-[:E]->(b), (a)-[:E]->(c), (b)-[:E]->(d), (c)-[:E]->(d)",
    )
    .unwrap();
    // Three reachable targets, one path each even though two paths of
    // length two reach the sink.
    assert_eq!(
        row_count(&db, "MATCH (a:D {id: 1})-[*bfs..3]->(x) RETURN x"),
        3
    );
    let result = db
        .execute("MATCH (a:D {id: 1})-[r *bfs..3]->(x:D {id: 4}) RETURN r")
        .unwrap();
    assert_eq!(result.results().len(), 1);
    assert!(matches!(&result.results()[0][0], TypedValue::List(edges) if edges.len() == 2));
}

#[test]
fn named_paths_collect_their_elements() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:P {id: 1})-[:E]->(:P {id: 2})").unwrap();
    let result = db.execute("MATCH p = (:P {id: 1})-[:E]->(:P) RETURN p").unwrap();
    assert_eq!(result.results().len(), 1);
    let TypedValue::Path(path) = &result.results()[0][0] else {
        panic!("expected a path");
    };
    assert_eq!(path.vertices.len(), 2);
    assert_eq!(path.edges.len(), 1);

    let size = db
        .execute("MATCH p = (:P {id: 1})-[:E]->(:P) RETURN size(nodes(p))")
        .unwrap();
    assert!(matches!(size.results()[0][0], TypedValue::Int(2)));
}

#[test]
fn delete_without_detach_fails_on_connected_vertex() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V)-[:E]->(:V)").unwrap();
    let err = db.execute("MATCH (n:V) DELETE n").unwrap_err();
    assert!(matches!(err, QueryError::Runtime(_)));
    // The failed transaction rolled back; everything is still there.
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 2);
    db.execute("MATCH (n:V) DETACH DELETE n").unwrap();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 0);
}

#[test]
fn delete_ignores_nulls() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V)").unwrap();
    db.execute("MATCH (n:V) OPTIONAL MATCH (n)-[r]->() DELETE r").unwrap();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 1);
}

#[test]
fn set_and_remove_labels_and_properties() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V {a: 1})").unwrap();

    db.execute("MATCH (n:V) SET n:Extra, n.b = 2").unwrap();
    assert_eq!(row_count(&db, "MATCH (n:Extra) RETURN n"), 1);
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.b = 2 RETURN n"), 1);

    db.execute("MATCH (n:V) SET n += {c: 3}").unwrap();
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.a = 1 AND n.c = 3 RETURN n"), 1);

    db.execute("MATCH (n:V) SET n = {only: true}").unwrap();
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.a IS NULL AND n.only = true RETURN n"), 1);

    db.execute("MATCH (n:V) REMOVE n:Extra, n.only").unwrap();
    assert_eq!(row_count(&db, "MATCH (n:Extra) RETURN n"), 0);
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.only IS NULL RETURN n"), 1);
}

#[test]
fn set_on_null_target_is_a_no_op() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V)").unwrap();
    db.execute("MATCH (n:V) OPTIONAL MATCH (n)-[]->(m) SET m.x = 1, m:L")
        .unwrap();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 1);
}

#[test]
fn three_valued_logic_in_filters() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V {v: 1}), (:V)").unwrap();
    // The null comparison drops the unset vertex without failing.
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.v < 10 RETURN n"), 1);
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.v IS NULL RETURN n"), 1);
    assert_eq!(
        row_count(&db, "MATCH (n:V) WHERE n.v = 1 OR n.v IS NULL RETURN n"),
        2
    );
}

#[test]
fn parameters_round_trip_and_missing_parameter_fails() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:Person {id: 1}), (:Person {id: 2})").unwrap();
    let mut params = HashMap::new();
    params.insert("id".to_owned(), TypedValue::Int(2));
    let result = db
        .execute_with_params("MATCH (n:Person) WHERE n.id = $id RETURN n", &params)
        .unwrap();
    assert_eq!(result.results().len(), 1);

    let err = db
        .execute("MATCH (n:Person) WHERE n.id = $id RETURN n")
        .unwrap_err();
    assert!(matches!(err, QueryError::UnprovidedParameter(name) if name == "id"));
}

#[test]
fn list_comprehension_and_in_operator() {
    let db = Database::new(Config::default());
    let result = db
        .execute("RETURN [x IN [1, 2, 3, 4] WHERE x % 2 = 0 | x * 10] AS doubled, 3 IN [1, 2, 3] AS member")
        .unwrap();
    let row = &result.results()[0];
    assert!(matches!(
        &row[0],
        TypedValue::List(items)
            if matches!(items[0], TypedValue::Int(20)) && matches!(items[1], TypedValue::Int(40))
    ));
    assert!(matches!(row[1], TypedValue::Bool(true)));
}

#[test]
fn created_data_is_visible_to_the_final_projection() {
    let db = Database::new(Config::default());
    let result = db.execute("CREATE (n:V {p: 7}) RETURN n.p").unwrap();
    assert_eq!(result.results().len(), 1);
    assert!(matches!(result.results()[0][0], TypedValue::Int(7)));
}

#[test]
fn writes_before_with_are_visible_after_it() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V {v: 1})").unwrap();
    let result = db
        .execute("MATCH (n:V) SET n.v = 2 WITH n MATCH (m:V) WHERE m.v = 2 RETURN m")
        .unwrap();
    assert_eq!(result.results().len(), 1);
}

#[test]
fn cypher_functions() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:A {s: 'abc'})-[:T]->(:B)").unwrap();
    let result = db
        .execute(
            "MATCH (a:A)-[r]->(b) \
             RETURN id(a), type(r), labels(a), size(a.s), coalesce(a.missing, 'fallback')",
        )
        .unwrap();
    let row = &result.results()[0];
    assert!(matches!(row[0], TypedValue::Int(_)));
    assert!(matches!(&row[1], TypedValue::String(t) if t == "T"));
    assert!(matches!(&row[2], TypedValue::List(labels) if labels.len() == 1));
    assert!(matches!(row[3], TypedValue::Int(3)));
    assert!(matches!(&row[4], TypedValue::String(s) if s == "fallback"));
}

#[test]
fn explicit_transaction_marks_failed_and_stays_open() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V)").unwrap();
    let tx = db.access();
    let params = HashMap::new();
    let err = db.execute_in(&tx, "MATCH (n:V) RETURN m", &params).unwrap_err();
    assert!(matches!(err, QueryError::Semantic(_)));
    assert!(tx.is_active());
    // Every further statement fails until the owner rolls back.
    let err = db.execute_in(&tx, "MATCH (n:V) RETURN n", &params).unwrap_err();
    assert!(matches!(err, QueryError::Runtime(_)));
    tx.abort();
}

#[test]
fn uncommitted_writes_are_invisible_to_other_transactions() {
    let db = Database::new(Config::default());
    let tx = db.access();
    let params = HashMap::new();
    db.execute_in(&tx, "CREATE (:V)", &params).unwrap();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 0);
    tx.commit();
    assert_eq!(row_count(&db, "MATCH (n) RETURN n"), 1);
}

#[test]
fn concurrent_writers_conflict() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V {v: 0})").unwrap();
    let params = HashMap::new();
    let tx1 = db.access();
    let tx2 = db.access();
    db.execute_in(&tx1, "MATCH (n:V) SET n.v = 1", &params).unwrap();
    let err = db
        .execute_in(&tx2, "MATCH (n:V) SET n.v = 2", &params)
        .unwrap_err();
    assert!(matches!(err, QueryError::TransactionConflict(_)));
    tx1.commit();
    tx2.abort();
    assert_eq!(row_count(&db, "MATCH (n:V) WHERE n.v = 1 RETURN n"), 1);
}

#[test]
fn abort_flag_surfaces_hinted_abort() {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let db = Database::new(Config::default());
    let accessor = db.access();
    let mut stream = trellis::CollectingStream::new();
    let abort = Arc::new(AtomicBool::new(true));
    let err = db
        .interpreter()
        .interpret_cancellable(
            "UNWIND range(1, 1000) AS x RETURN x",
            &accessor,
            &mut stream,
            &HashMap::new(),
            false,
            Arc::clone(&abort),
        )
        .unwrap_err();
    assert_eq!(err, QueryError::HintedAbort);
    // The implicit transaction was aborted on the way out.
    assert!(!accessor.is_active());
}

#[test]
fn pure_mutations_have_empty_headers() {
    let db = Database::new(Config::default());
    let result = db.execute("CREATE (:V)").unwrap();
    assert!(result.header().is_empty());
    assert!(result.results().is_empty());
}

#[test]
fn summary_carries_timings_and_type() {
    let db = Database::new(Config::default());
    db.execute("CREATE (:V)").unwrap();

    let read = db.execute("MATCH (n) RETURN n").unwrap();
    for key in ["parsing_time", "planning_time", "plan_execution_time", "cost_estimate"] {
        assert!(matches!(read.summary().get(key), Some(TypedValue::Double(_))), "{key}");
    }
    assert!(matches!(read.summary().get("type"), Some(TypedValue::String(t)) if t == "r"));

    let write = db.execute("CREATE (:W)").unwrap();
    assert!(matches!(write.summary().get("type"), Some(TypedValue::String(t)) if t == "w"));

    let rw = db.execute("MATCH (n:W) SET n.x = 1").unwrap();
    assert!(matches!(rw.summary().get("type"), Some(TypedValue::String(t)) if t == "rw"));

    let schema = db.execute("CREATE INDEX ON :W(x)").unwrap();
    assert!(matches!(schema.summary().get("type"), Some(TypedValue::String(t)) if t == "schema"));
}
