//! Run with `DATABASE_URL=postgres://... cargo test -p pgsession-sqlx --features integration`.
#![cfg(feature = "integration")]

use std::time::Duration;

use pgsession::{ConnectionPool, Session};
use pgsession_core::DatabaseConfig;
use pgsession_sqlx::{PoolRegistry, SqlxPool};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn pool() -> SqlxPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    SqlxPool::connect(&DatabaseConfig::new(url).with_pool_size(4))
        .await
        .expect("database reachable")
}

#[tokio::test]
async fn test_query_decodes_column_types() {
    let pool = pool().await;
    let mut session = Session::open(pool.shared()).await.unwrap();

    let rows = session
        .query(
            "SELECT 1::int4 AS i, 2::int8 AS l, 1.5::float8 AS f, true AS b, 'x'::text AS t, \
             '{\"a\":[1]}'::jsonb AS j, NULL::int4 AS n, 12.50::numeric AS d",
            &[],
        )
        .await
        .unwrap();

    let row = &rows[0];
    assert_eq!(row["i"], 1);
    assert_eq!(row["l"], 2);
    assert_eq!(row["f"], 1.5);
    assert_eq!(row["b"], true);
    assert_eq!(row["t"], "x");
    assert_eq!(row["j"], json!({ "a": [1] }));
    assert_eq!(row["n"], Value::Null);
    assert_eq!(row["d"], "12.50");
    session.disconnect();
}

#[tokio::test]
async fn test_parameters_bind_from_json() {
    let pool = pool().await;
    let mut session = Session::open(pool.shared()).await.unwrap();

    let rows = session
        .query(
            "SELECT $1::int8 + 1 AS n, $2::text AS s, $3::jsonb -> 'k' AS j",
            &[json!(41), json!("hi"), json!({ "k": [true] })],
        )
        .await
        .unwrap();

    assert_eq!(rows[0]["n"], 42);
    assert_eq!(rows[0]["s"], "hi");
    assert_eq!(rows[0]["j"], json!([true]));
    session.disconnect();
}

#[tokio::test]
async fn test_transaction_rollback_discards_writes() {
    let pool = pool().await;
    let mut setup = Session::open(pool.shared()).await.unwrap();
    setup
        .query("CREATE TABLE IF NOT EXISTS pgsession_it (id int8 PRIMARY KEY)", &[])
        .await
        .unwrap();
    setup.query("DELETE FROM pgsession_it", &[]).await.unwrap();
    setup.disconnect();

    let mut session = Session::begin(pool.shared()).await.unwrap();
    session
        .query("INSERT INTO pgsession_it (id) VALUES ($1)", &[json!(1)])
        .await
        .unwrap();
    session.rollback().await.unwrap();

    let mut check = Session::open(pool.shared()).await.unwrap();
    let rows = check.query("SELECT count(*) AS c FROM pgsession_it", &[]).await.unwrap();
    assert_eq!(rows[0]["c"], 0);
    check.disconnect();
}

#[tokio::test]
async fn test_emit_reaches_other_session() {
    let pool = pool().await;
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let mut emitter = Session::open(pool.shared()).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    listener
        .on("pgsession_it", move |args: &[Value]| {
            let _ = tx.send(args.to_vec());
        })
        .await
        .unwrap();
    emitter
        .emit("pgsession_it", &[json!(1), json!("two"), json!({ "three": 3 })])
        .await
        .unwrap();

    let received = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, vec![json!(1), json!("two"), json!({ "three": 3 })]);

    listener.disconnect();
    emitter.disconnect();
}

#[tokio::test]
async fn test_terminated_backend_fails_transaction() {
    let pool = pool().await;
    let mut session = Session::begin(pool.shared()).await.unwrap();
    let rows = session.query("SELECT pg_backend_pid() AS pid", &[]).await.unwrap();
    let pid = rows[0]["pid"].clone();

    let mut admin = Session::open(pool.shared()).await.unwrap();
    admin
        .query("SELECT pg_terminate_backend($1::int4)", &[pid])
        .await
        .unwrap();
    admin.disconnect();

    assert!(session.commit().await.is_err());
    assert!(session.query("SELECT 1", &[]).await.is_err());
    session.disconnect();
}

#[tokio::test]
async fn test_once_then_on_keeps_listening() {
    let pool = pool().await;
    let mut session = Session::open(pool.shared()).await.unwrap();
    let mut emitter = Session::open(pool.shared()).await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for round in 0..10 {
        let first = tx.clone();
        session
            .once("pgsession_once", move |args: &[Value]| {
                let _ = first.send(args.to_vec());
            })
            .await
            .unwrap();
        emitter.emit("pgsession_once", &[json!(round)]).await.unwrap();
        let received = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, vec![json!(round)]);

        let again = tx.clone();
        let id = session
            .on("pgsession_once", move |args: &[Value]| {
                let _ = again.send(args.to_vec());
            })
            .await
            .unwrap();
        let channels = session
            .query("SELECT pg_listening_channels() AS c", &[])
            .await
            .unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0]["c"], "pgsession_once");
        session.remove_listener("pgsession_once", id).await.unwrap();
    }

    session.disconnect();
    emitter.disconnect();
}

#[tokio::test]
async fn test_released_connections_return_to_pool() {
    let pool = pool().await;
    let mut session = Session::begin(pool.shared()).await.unwrap();
    session.query("SELECT 1", &[]).await.unwrap();
    session.commit().await.unwrap();

    for _ in 0..50 {
        if pool.status().idle == pool.status().size {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pool.status().idle, pool.status().size);
}

#[tokio::test]
async fn test_registry_reuses_pool() {
    let url = std::env::var("DATABASE_URL").unwrap();
    let registry = PoolRegistry::new();
    let config = DatabaseConfig::new(url);

    registry.get_or_connect(&config).await.unwrap();
    registry.get_or_connect(&config).await.unwrap();

    assert_eq!(registry.len(), 1);
    registry.close_all().await;
}
