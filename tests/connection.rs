//! Session lifecycle and metadata accessors.

mod common;

use std::time::Duration;

use common::{conninfo, get_conn};
use zero_pq::pq::{ConnStatus, PgConn};
use zero_pq::{Connection, ErrorKind, Opts, TransactionStatus};

#[test]
fn open_and_inspect() {
    let conn = get_conn();

    assert!(!conn.closed());
    assert_eq!(conn.conninfo(), conninfo());
    assert_eq!(conn.protocol_version().unwrap(), 3);
    assert!(conn.server_version().unwrap() >= 90000);
    assert!(conn.port().unwrap() > 0);
    assert!(!conn.host().unwrap().is_empty());
    assert!(!conn.user().unwrap().is_empty());
    assert_eq!(conn.tty().unwrap(), "");
    assert!(conn.backend_pid().unwrap() > 0);
    assert!(conn.socket().unwrap().is_some());
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
    assert_eq!(
        conn.parameter_status("client_encoding").unwrap().as_deref(),
        Some("UTF8")
    );
    assert!(conn.integer_datetimes().unwrap());
}

#[test]
fn backend_pid_matches_server() {
    let conn = get_conn();
    let row = conn
        .execute("SELECT pg_backend_pid()", &())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let pid: i32 = row.get(0).unwrap();
    assert_eq!(pid as u32, conn.backend_pid().unwrap());
}

#[test]
fn closed_connection_guard() {
    let conn = get_conn();
    conn.close();
    assert!(conn.closed());
    conn.close();

    let not_open = |kind: ErrorKind| assert_eq!(kind, ErrorKind::Programming);
    not_open(conn.host().unwrap_err().kind());
    not_open(conn.port().unwrap_err().kind());
    not_open(conn.db().unwrap_err().kind());
    not_open(conn.user().unwrap_err().kind());
    not_open(conn.password().unwrap_err().kind());
    not_open(conn.options().unwrap_err().kind());
    not_open(conn.protocol_version().unwrap_err().kind());
    not_open(conn.server_version().unwrap_err().kind());
    not_open(conn.transaction_status().unwrap_err().kind());
    not_open(conn.socket().unwrap_err().kind());
    not_open(conn.notices().unwrap_err().kind());

    let err = conn.execute("SELECT 1", &()).unwrap_err();
    assert_eq!(err.to_string(), "Database connection not open");
    assert!(err.is_database_error());
}

#[test]
fn clones_share_the_session() {
    let conn = get_conn();
    let other = conn.clone();
    other.close();
    assert!(conn.closed());
}

#[test]
fn connect_failure_is_operational() {
    let err = Connection::open("host=127.0.0.1 port=1 sslmode=disable connect_timeout=2")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    assert!(err.to_string().contains("connection to server at \"127.0.0.1\", port 1 failed"));
}

#[test]
fn native_connect_takes_opts_as_given() {
    let opts = Opts::try_from(conninfo().as_str())
        .unwrap()
        .with_env_defaults();
    let pq = PgConn::connect(opts.clone()).unwrap();
    assert_eq!(pq.user(), opts.user);
    pq.finish();

    // no environment lookup fills the blank user back in
    let mut blank = opts;
    blank.user = String::new();
    match PgConn::connect(blank) {
        Ok(pq) => {
            assert_ne!(pq.status(), ConnStatus::Ok);
            assert_eq!(pq.user(), "");
        }
        Err(e) => assert!(e.to_message().contains("user"), "{}", e.to_message()),
    }
}

#[test]
fn bad_conninfo_is_operational() {
    let err = Connection::open("host=localhost bogus=1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    assert!(err.to_string().contains("bogus"));
}

#[test]
fn notices_accumulate() {
    let conn = get_conn();
    conn.execute("DO $$ BEGIN RAISE NOTICE 'first'; END $$", &())
        .unwrap();
    conn.execute("DO $$ BEGIN RAISE NOTICE 'second'; END $$", &())
        .unwrap();

    let notices = conn.notices().unwrap();
    assert_eq!(notices, ["NOTICE:  first\n", "NOTICE:  second\n"]);
    // reading does not prune
    assert_eq!(conn.notices().unwrap().len(), 2);

    assert_eq!(conn.take_notices().unwrap().len(), 2);
    assert!(conn.notices().unwrap().is_empty());
}

#[test]
fn transactions() {
    let conn = get_conn();
    conn.execute("CREATE TEMP TABLE tx_items (n int)", &()).unwrap();

    conn.commit().unwrap();
    conn.begin().unwrap();
    assert_eq!(
        conn.transaction_status().unwrap(),
        TransactionStatus::InTransaction
    );
    // already open: no second BEGIN, so no warning notice
    conn.begin().unwrap();
    conn.execute("INSERT INTO tx_items VALUES (1)", &()).unwrap();
    conn.rollback().unwrap();
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);

    let count = conn.execute("SELECT count(*) FROM tx_items", &()).unwrap();
    let row = count.into_iter().next().unwrap().unwrap();
    assert_eq!(row.get::<i64>(0).unwrap(), 0);
    assert!(conn.notices().unwrap().is_empty());

    conn.begin().unwrap();
    let _ = conn.execute("SELECT 1/0", &()).unwrap_err();
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::InError);
    conn.rollback().unwrap();
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
}

#[test]
fn terminated_backend_breaks_session() {
    let conn = get_conn();
    let victim = get_conn();
    let pid = victim.backend_pid().unwrap();
    conn.execute("SELECT pg_terminate_backend($1)", &(pid,))
        .unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let err = victim.execute("SELECT 1", &()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Operational);
    assert_eq!(
        victim.transaction_status().unwrap(),
        TransactionStatus::Unknown
    );
    assert!(victim.socket().unwrap().is_none());
}
