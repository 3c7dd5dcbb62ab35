//! The Tokio facade.
#![cfg(feature = "tokio")]

mod common;

use std::time::{Duration, Instant};

use common::conninfo;
use zero_pq::tokio::AsyncConnection;
use zero_pq::{Outcome, TransactionStatus};

#[tokio::test]
async fn open_execute_close() {
    let conn = AsyncConnection::open(conninfo()).await.unwrap();
    let result = conn
        .execute("SELECT $1::int + 1", (41,))
        .await
        .unwrap();
    assert_eq!(result.outcome(), Outcome::Query);
    let values: Vec<i32> = result.map(|row| row.unwrap().get(0).unwrap()).collect();
    assert_eq!(values, [42]);

    conn.begin().await.unwrap();
    assert_eq!(
        conn.transaction_status().await.unwrap(),
        TransactionStatus::InTransaction
    );
    conn.rollback().await.unwrap();
    assert_eq!(
        conn.parameter_status("client_encoding").await.unwrap().as_deref(),
        Some("UTF8")
    );

    conn.close().await.unwrap();
    assert!(conn.closed());
    assert!(conn.host().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metadata_does_not_wait_for_a_running_statement() {
    let conn = AsyncConnection::open(conninfo()).await.unwrap();
    let sleeper = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.execute("SELECT pg_sleep(1)", ()).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    assert!(!conn.host().unwrap().is_empty());
    assert!(conn.backend_pid().unwrap() > 0);
    assert!(conn.server_version().unwrap() > 0);
    assert!(started.elapsed() < Duration::from_millis(200));

    // session calls queue behind the running statement
    let started = Instant::now();
    conn.transaction_status().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));

    sleeper.await.unwrap().unwrap();
}
