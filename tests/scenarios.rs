//! End-to-end scenarios S1-S6 (spec.md §8), driven through `Engine::execute_sql`.

use relfile::result::StatementResult;
use relfile::{Engine, EngineConfig};
use tempfile::TempDir;

fn engine() -> (TempDir, Engine) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
    (dir, engine)
}

fn only_select(results: Vec<StatementResult>) -> relfile::result::SelectResult {
    match results.into_iter().next().unwrap() {
        StatementResult::Select(r) => r,
        other => panic!("expected a Select result, got {other:?}"),
    }
}

/// S1: AVL-indexed equality SELECT returns exactly the matching row.
#[test]
fn s1_equality_select_on_avl_index() {
    let (_dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, name VARCHAR[20] INDEX avl);");
    engine.execute_sql("INSERT INTO t VALUES (1,'mango'),(2,'banana'),(3,'papaya');");
    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE name='banana';"));
    assert_eq!(select.rows.len(), 1);
    assert_eq!(select.rows[0]["id"].as_i64(), Some(2));
    assert_eq!(select.rows[0]["name"].as_str(), Some("banana"));
}

/// S2: a hash bucket filled past capacity (FB=5) still returns every
/// colliding record, and deleting one leaves the other five retrievable.
#[test]
fn s2_hash_bucket_overflow_and_delete() {
    let (_dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, tag VARCHAR[20] INDEX hash);");
    for i in 1..=6 {
        engine.execute_sql(&format!("INSERT INTO t VALUES ({i}, 'COLLIDE');"));
    }
    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE tag='COLLIDE';"));
    assert_eq!(select.rows.len(), 6);

    engine.execute_sql("DELETE FROM t WHERE id=1;");
    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE tag='COLLIDE';"));
    assert_eq!(select.rows.len(), 5);
    assert!(select.rows.iter().all(|r| r["id"].as_i64() != Some(1)));
}

/// S3: AVL range query via BETWEEN.
#[test]
fn s3_avl_range_between() {
    let (_dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, price DECIMAL INDEX avl);");
    engine.execute_sql("INSERT INTO t VALUES (1, 3.0), (2, 7.0), (3, 11.0), (4, 13.5);");
    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE price BETWEEN 5 AND 12;"));
    assert_eq!(select.rows.len(), 2);
    let mut ids: Vec<i64> = select.rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3]);
}

/// S4: R-tree radius and KNN queries.
#[test]
fn s4_rtree_radius_and_knn() {
    let (_dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, location POINT INDEX rtree);");
    engine.execute_sql("INSERT INTO t VALUES (1, (0,0)), (2, (3,4)), (3, (10,10)), (4, (-2,1));");

    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE RADIUS(location, (0,0), 6.0);"));
    let mut ids: Vec<i64> = select.rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE KNN(location, (0.5,0.5), 2);"));
    let mut ids: Vec<i64> = select.rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

/// S5: deleting a record and inserting a new one reuses the freed slot, and
/// every index reflects only the new row at that record number.
#[test]
fn s5_delete_then_insert_reuses_slot() {
    let (_dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, name VARCHAR[20] INDEX avl);");
    engine.execute_sql("INSERT INTO t VALUES (1,'a'),(2,'b'),(3,'c');");

    let deleted_record_number = match engine.execute_sql("DELETE FROM t WHERE id=2;").into_iter().next().unwrap() {
        StatementResult::Delete(r) => r.deleted[0],
        other => panic!("expected Delete, got {other:?}"),
    };

    let inserted_record_number = match engine.execute_sql("INSERT INTO t VALUES (9,'z');").into_iter().next().unwrap() {
        StatementResult::Insert(r) => r.results[0].record_number.unwrap(),
        other => panic!("expected Insert, got {other:?}"),
    };
    assert_eq!(inserted_record_number, deleted_record_number);

    let old_name_select = only_select(engine.execute_sql("SELECT * FROM t WHERE name='b';"));
    assert!(old_name_select.rows.is_empty());

    let new_select = only_select(engine.execute_sql("SELECT * FROM t WHERE id=9;"));
    assert_eq!(new_select.rows.len(), 1);
    assert_eq!(new_select.rows[0]["name"].as_str(), Some("z"));
}

/// S6: CSV import with a missing value in one row falls back to the type
/// default, and a row with an empty primary-key cell is skipped.
#[test]
fn s6_csv_import_default_and_missing_pk() {
    let (dir, mut engine) = engine();
    engine.execute_sql("CREATE TABLE t(id INT KEY, name VARCHAR[20], price DECIMAL);");

    let csv_path = dir.path().join("people.csv");
    std::fs::write(&csv_path, "id,name,price\n1,mango,2.5\n,banana,\n").unwrap();

    let import = match engine
        .execute_sql(&format!("IMPORT FROM CSV '{}' INTO t;", csv_path.display()))
        .into_iter()
        .next()
        .unwrap()
    {
        StatementResult::Import(r) => r,
        other => panic!("expected Import, got {other:?}"),
    };
    assert_eq!(import.successes, 1);
    assert_eq!(import.failures, 1);

    let select = only_select(engine.execute_sql("SELECT * FROM t WHERE id=1;"));
    assert_eq!(select.rows.len(), 1);
    assert_eq!(select.rows[0]["name"].as_str(), Some("mango"));

    let all = only_select(engine.execute_sql("SELECT * FROM t;"));
    assert_eq!(all.rows.len(), 1);
}
