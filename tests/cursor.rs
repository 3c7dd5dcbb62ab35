//! Cursors: placeholder rewriting, server-side cursors and fetching.

mod common;

use std::collections::HashMap;

use common::get_conn;
use zero_pq::{ErrorKind, Outcome, TransactionStatus};

#[test]
fn select_runs_behind_a_declared_cursor() {
    let conn = get_conn();
    let mut cursor = conn.cursor();
    cursor
        .execute("SELECT n, n * 2 AS twice FROM generate_series(1, %s) AS n", &(25,))
        .unwrap();

    // rows are fetched on demand, so the count is unknown
    assert_eq!(cursor.row_count(), None);
    assert_eq!(cursor.outcome(), Some(Outcome::Query));
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::InTransaction);
    let names: Vec<&str> = cursor
        .description()
        .unwrap()
        .iter()
        .map(|c| c.name())
        .collect();
    assert_eq!(names, ["n", "twice"]);

    let first = cursor.fetch_one().unwrap().unwrap();
    assert_eq!(first.get::<i32>(0).unwrap(), 1);
    assert_eq!(first.get::<i32>(1).unwrap(), 2);

    let batch = cursor.fetch_many(None).unwrap();
    assert_eq!(batch.len(), 10);
    assert_eq!(batch[0].get::<i32>(0).unwrap(), 2);

    cursor.set_array_size(3);
    assert_eq!(cursor.fetch_many(None).unwrap().len(), 3);
    assert!(cursor.fetch_many(Some(0)).unwrap().is_empty());

    let rest = cursor.fetch_all().unwrap();
    assert_eq!(rest.len(), 11);
    assert_eq!(rest[10].get::<i32>(0).unwrap(), 25);
    assert!(cursor.fetch_one().unwrap().is_none());

    cursor.close().unwrap();
    conn.commit().unwrap();
}

#[test]
fn other_statements_run_directly() {
    let conn = get_conn();
    let mut cursor = conn.cursor();
    cursor
        .execute("CREATE TEMP TABLE c (id int, label text)", &())
        .unwrap();
    assert_eq!(cursor.outcome(), Some(Outcome::SchemaChange));
    assert!(cursor.description().is_none());

    cursor
        .execute("INSERT INTO c VALUES (%s, %s), (%s, %s)", &(1, "one", 2, "two"))
        .unwrap();
    assert_eq!(cursor.outcome(), Some(Outcome::DataModification));
    assert_eq!(cursor.row_count(), Some(2));
    assert_eq!(cursor.oid(), None);

    let err = cursor.fetch_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(err.to_string().contains("No results pending"), "{err}");

    // a RETURNING clause gives buffered rows with a known count
    cursor
        .execute("UPDATE c SET label = upper(label) RETURNING label", &())
        .unwrap();
    assert_eq!(cursor.outcome(), Some(Outcome::Query));
    assert_eq!(cursor.row_count(), Some(2));
    let mut labels: Vec<String> = cursor
        .fetch_all()
        .unwrap()
        .iter()
        .map(|row| row.get(0).unwrap())
        .collect();
    labels.sort();
    assert_eq!(labels, ["ONE", "TWO"]);
}

#[test]
fn select_for_update_is_buffered() {
    let conn = get_conn();
    conn.execute("CREATE TEMP TABLE locked (id int)", &()).unwrap();
    conn.execute("INSERT INTO locked SELECT generate_series(1, 3)", &())
        .unwrap();

    let mut cursor = conn.cursor();
    cursor
        .execute("SELECT id FROM locked ORDER BY id FOR UPDATE", &())
        .unwrap();
    assert_eq!(cursor.row_count(), Some(3));
    assert_eq!(cursor.fetch_many(Some(2)).unwrap().len(), 2);
    assert_eq!(cursor.fetch_all().unwrap().len(), 1);
}

#[test]
fn named_placeholders() {
    let conn = get_conn();
    let mut params = HashMap::new();
    params.insert("low", 3);
    params.insert("high", 5);

    let mut cursor = conn.cursor();
    cursor
        .execute_named(
            "SELECT n FROM generate_series(%(low)s, %(high)s) AS n WHERE n <> %(low)s",
            &params,
        )
        .unwrap();
    let values: Vec<i32> = cursor
        .fetch_all()
        .unwrap()
        .iter()
        .map(|row| row.get(0).unwrap())
        .collect();
    assert_eq!(values, [4, 5]);

    let err = cursor
        .execute_named("SELECT %(missing)s", &params)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
}

#[test]
fn placeholder_count_is_checked() {
    let conn = get_conn();
    let mut cursor = conn.cursor();
    let err = cursor.execute("SELECT %s, %s", &(1,)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(err.to_string().contains("expected 2, got 1"), "{err}");
}

#[test]
fn execute_closes_the_previous_cursor() {
    let conn = get_conn();
    let mut cursor = conn.named_cursor("reused \"name\"");
    assert_eq!(cursor.name(), "reused \"name\"");

    cursor.execute("SELECT 1", &()).unwrap();
    // the same portal name is declared again, which needs the first one closed
    cursor.execute("SELECT 2", &()).unwrap();
    let row = cursor.fetch_one().unwrap().unwrap();
    assert_eq!(row.get::<i32>(0).unwrap(), 2);
}

#[test]
fn closed_cursor_refuses_work() {
    let conn = get_conn();
    let mut cursor = conn.cursor();
    cursor.execute("SELECT 1", &()).unwrap();
    cursor.close().unwrap();
    assert!(cursor.is_closed());
    cursor.close().unwrap();

    let err = cursor.fetch_one().unwrap_err();
    assert_eq!(err.to_string(), "Cursor not open");
    let err = cursor.execute("SELECT 1", &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);

    // the connection is untouched
    assert_eq!(conn.execute("SELECT 1", &()).unwrap().row_count(), 1);
}

#[test]
fn cursor_after_commit() {
    let conn = get_conn();
    let mut cursor = conn.cursor();
    cursor.execute("SELECT 1", &()).unwrap();
    conn.commit().unwrap();
    // the portal went away with the transaction; reset must not try to close it
    cursor.reset().unwrap();
    assert!(cursor.description().is_none());
}
