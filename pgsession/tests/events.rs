use std::time::Duration;

use pgsession::{init_tracing, Session, NOTIFICATION_META};
use pgsession_test::MockPool;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

type Received = mpsc::UnboundedReceiver<Vec<Value>>;

fn recorder() -> (impl Fn(&[Value]) + Send + Sync + 'static, Received) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |args: &[Value]| {
        let _ = tx.send(args.to_vec());
    }, rx)
}

async fn next(rx: &mut Received) -> Vec<Value> {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event within 2s")
        .expect("sender dropped")
}

async fn nothing_within(rx: &mut Received, ms: u64) -> bool {
    timeout(Duration::from_millis(ms), rx.recv()).await.is_err()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

#[tokio::test]
async fn test_emit_round_trip_between_sessions() {
    let pool = MockPool::new(2);
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let mut emitter = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();

    listener.on("accounts", handler).await.unwrap();
    let args = [json!(1), json!("two"), json!({ "three": [3, 3.5, null] })];
    emitter.emit("accounts", &args).await.unwrap();

    assert_eq!(next(&mut rx).await, args.to_vec());
    assert!(pool
        .statements()
        .contains(&"LISTEN \"accounts\"".to_string()));

    listener.disconnect();
    emitter.disconnect();
}

#[tokio::test]
async fn test_plain_text_payload_is_single_argument() {
    let pool = MockPool::new(2);
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let mut sender = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    listener.on("greetings", handler).await.unwrap();

    sender.notify("greetings", Some("hello world")).await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!("hello world")]);

    sender.notify("greetings", Some("[not json")).await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!("[not json")]);

    sender.notify("greetings", Some("[\"a\",2]")).await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!("a"), json!(2)]);

    listener.disconnect();
    sender.disconnect();
}

#[tokio::test]
async fn test_external_notification_reaches_listener() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    session.on("jobs", handler).await.unwrap();

    pool.notify("jobs", "{\"id\":4}");

    assert_eq!(next(&mut rx).await, vec![json!("{\"id\":4}")]);
    session.disconnect();
}

#[tokio::test]
async fn test_emit_without_args_sends_bare_notify() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    session.on("ping", handler).await.unwrap();

    session.emit("ping", &[]).await.unwrap();

    assert_eq!(next(&mut rx).await, Vec::<Value>::new());
    assert!(pool.statements().contains(&"NOTIFY \"ping\"".to_string()));
    session.disconnect();
}

#[tokio::test]
async fn test_payload_quotes_are_escaped() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    session.on("notes", handler).await.unwrap();

    session.notify("notes", Some("it's")).await.unwrap();

    assert_eq!(next(&mut rx).await, vec![json!("it's")]);
    assert!(pool
        .statements()
        .contains(&"NOTIFY \"notes\", 'it''s'".to_string()));
    session.disconnect();
}

#[tokio::test]
async fn test_once_fires_once_and_unlistens() {
    let pool = MockPool::new(2);
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let mut sender = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();

    listener.once("orders", handler).await.unwrap();
    sender.emit("orders", &[json!(1)]).await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!(1)]);

    eventually(|| pool.statements().contains(&"UNLISTEN \"orders\"".to_string())).await;
    assert_eq!(listener.listeners().channels().len(), 0);

    sender.emit("orders", &[json!(2)]).await.unwrap();
    assert!(nothing_within(&mut rx, 100).await);

    listener.disconnect();
    sender.disconnect();
}

#[tokio::test]
async fn test_remove_listener_unlistens() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    let id = session.on("audit", handler).await.unwrap();

    assert!(session.remove_listener("audit", id).await.unwrap());
    assert!(pool.statements().contains(&"UNLISTEN \"audit\"".to_string()));

    pool.notify("audit", "ignored");
    assert!(nothing_within(&mut rx, 100).await);

    assert!(!session.remove_listener("audit", id).await.unwrap());
    session.disconnect();
}

#[tokio::test]
async fn test_add_listener_is_alias_of_on() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();

    session.add_listener("alias", handler).await.unwrap();
    pool.notify("alias", "x");

    assert_eq!(next(&mut rx).await, vec![json!("x")]);
    session.disconnect();
}

#[tokio::test]
async fn test_meta_channels_stay_local() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();

    let id = session.on("$progress", handler).await.unwrap();
    session.emit("$progress", &[json!(50), json!("%")]).await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!(50), json!("%")]);

    assert!(session.remove_listener("$progress", id).await.unwrap());
    assert!(pool.statements().is_empty());
    session.disconnect();
}

#[tokio::test]
async fn test_meta_channels_work_without_connection() {
    let pool = MockPool::new(1);
    let mut session = Session::new(pool.shared());
    let (handler, mut rx) = recorder();

    session.subscribe_meta("local", handler);
    session.emit("$local", &[json!(true)]).await.unwrap();

    assert_eq!(next(&mut rx).await, vec![json!(true)]);
    assert_eq!(pool.acquire_count(), 0);
}

#[tokio::test]
async fn test_notification_meta_sees_raw_notifications() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (raw, mut raw_rx) = recorder();
    session.on(NOTIFICATION_META, raw).await.unwrap();
    session.listen("metrics").await.unwrap();

    pool.notify("metrics", "[1,2]");

    let event = next(&mut raw_rx).await;
    assert_eq!(event.len(), 1);
    assert_eq!(event[0]["name"], "notification");
    assert_eq!(event[0]["channel"], "metrics");
    assert_eq!(event[0]["payload"], "[1,2]");
    assert_eq!(event[0]["processId"], 0);
    session.disconnect();
}

#[tokio::test]
async fn test_invalid_channel_names_are_rejected() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();

    for name in ["bad-name", "1abc", "", "drop table", "\"quoted\""] {
        let err = session.on(name, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("channel"), "{name}: {err}");
        assert!(session.emit(name, &[json!(1)]).await.is_err());
        assert!(session.listen(name).await.is_err());
    }

    assert!(pool.statements().is_empty());
    assert!(session.listeners().channels().is_empty());
    session.disconnect();
}

#[tokio::test]
async fn test_failed_listen_undoes_registration() {
    let pool = MockPool::new(1);
    pool.fail_once("LISTEN", "permission denied");
    let mut session = Session::open(pool.shared()).await.unwrap();

    let err = session.on("secure", |_| {}).await.unwrap_err();

    assert!(err.is_query());
    assert!(session.listeners().channels().is_empty());
    session.disconnect();
}

#[tokio::test]
async fn test_subscribe_on_disconnected_session_fails() {
    let pool = MockPool::new(1);
    let mut session = Session::new(pool.shared());

    let err = session.subscribe_channel("updates", |_| {}).await.unwrap_err();

    assert!(err.is_disconnected());
    assert!(session.listeners().channels().is_empty());
}

#[tokio::test]
async fn test_emit_inside_transaction_is_delivered_on_commit() {
    let pool = MockPool::new(2);
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    listener.on("ledger", handler).await.unwrap();

    let mut writer = Session::begin(pool.shared()).await.unwrap();
    writer.emit("ledger", &[json!("credit")]).await.unwrap();
    assert!(nothing_within(&mut rx, 50).await);

    writer.commit().await.unwrap();
    assert_eq!(next(&mut rx).await, vec![json!("credit")]);

    let mut aborted = Session::begin(pool.shared()).await.unwrap();
    aborted.emit("ledger", &[json!("debit")]).await.unwrap();
    aborted.rollback().await.unwrap();
    assert!(nothing_within(&mut rx, 50).await);

    listener.disconnect();
}

#[tokio::test]
async fn test_panicking_listener_does_not_stop_others() {
    init_tracing();
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    session
        .on("fragile", |_| panic!("listener blew up"))
        .await
        .unwrap();
    session.on("fragile", handler).await.unwrap();

    pool.notify("fragile", "first");
    assert_eq!(next(&mut rx).await, vec![json!("first")]);

    pool.notify("fragile", "second");
    assert_eq!(next(&mut rx).await, vec![json!("second")]);
    session.disconnect();
}

#[tokio::test]
async fn test_listeners_survive_reconnect() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();
    session.on("jobs", handler).await.unwrap();
    session.disconnect();

    session.connect().await.unwrap();
    session.listen("jobs").await.unwrap();
    pool.notify("jobs", "after");

    assert_eq!(next(&mut rx).await, vec![json!("after")]);
    session.disconnect();
}

#[tokio::test]
async fn test_listen_then_unlisten_issue_one_statement_each() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();

    for name in ["a", "Orders", "queue_2"] {
        pool.clear_statements();
        session.listen(name).await.unwrap();
        session.unlisten(name).await.unwrap();
        assert_eq!(
            pool.statements(),
            [format!("LISTEN \"{name}\""), format!("UNLISTEN \"{name}\"")]
        );
    }
    assert!(session.is_connected());
    session.disconnect();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_on_after_once_fires_keeps_channel_listened() {
    let pool = MockPool::new(1);
    let mut session = Session::open(pool.shared()).await.unwrap();

    for _ in 0..50 {
        let (first, mut first_rx) = recorder();
        session.once("jobs", first).await.unwrap();
        pool.notify("jobs", "x");
        assert_eq!(next(&mut first_rx).await, vec![json!("x")]);

        let (second, _second_rx) = recorder();
        let id = session.on("jobs", second).await.unwrap();
        assert_eq!(pool.listening(1), vec!["jobs"]);
        assert!(session.remove_listener("jobs", id).await.unwrap());
    }

    let statements = pool.statements();
    let unlisten = statements
        .iter()
        .position(|sql| sql == "UNLISTEN \"jobs\"")
        .unwrap();
    assert_eq!(statements[unlisten + 1], "LISTEN \"jobs\"");
    session.disconnect();
}

#[tokio::test]
async fn test_once_handler_runs_when_unlisten_fails() {
    init_tracing();
    let pool = MockPool::new(2);
    pool.fail_on("UNLISTEN", "permission denied");
    let mut listener = Session::open(pool.shared()).await.unwrap();
    let mut sender = Session::open(pool.shared()).await.unwrap();
    let (handler, mut rx) = recorder();

    listener.once("orders", handler).await.unwrap();
    sender.emit("orders", &[json!("shipped")]).await.unwrap();

    assert_eq!(next(&mut rx).await, vec![json!("shipped")]);
    assert!(pool.statements().contains(&"UNLISTEN \"orders\"".to_string()));
    assert!(listener.listeners().channels().is_empty());
    assert!(listener.is_connected());
    assert!(listener.query("SELECT 1", &[]).await.is_ok());

    listener.disconnect();
    sender.disconnect();
}
