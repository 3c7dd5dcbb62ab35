use std::env;

use zero_pq::Connection;

pub fn conninfo() -> String {
    let mut db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/postgres".to_string());
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    db_url
}

pub fn get_conn() -> Connection {
    Connection::open(&conninfo()).expect("Failed to connect")
}
