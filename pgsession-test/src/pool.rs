use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pgsession_core::{
    Acquired, BoxError, ConnectionPool, Notification, PhysicalConnection, PoolStatus, QueryOutput,
    Row,
};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::sql::{parse_command, Command};

const NOTIFICATION_BUFFER: usize = 256;

/// Error produced by injected failures and pool exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MockError {}

/// One statement as received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Id of the physical connection that ran it.
    pub connection: u32,
    pub sql: String,
    pub params: Vec<Value>,
}

struct Failure {
    pattern: String,
    message: String,
    once: bool,
}

struct ConnState {
    sender: broadcast::Sender<Notification>,
    /// Bumped on every release; handles from older checkouts are stale.
    generation: u64,
    listening: HashSet<String>,
    in_transaction: bool,
    pending: Vec<(String, String)>,
}

impl ConnState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            sender,
            generation: 0,
            listening: HashSet::new(),
            in_transaction: false,
            pending: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.listening.clear();
        self.in_transaction = false;
        self.pending.clear();
    }
}

#[derive(Default)]
struct State {
    max_size: u32,
    connections: HashMap<u32, ConnState>,
    idle: Vec<u32>,
    next_id: u32,
    statements: Vec<Statement>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<Failure>,
    acquire_failure: Option<String>,
    acquired: usize,
    released: usize,
}

impl State {
    fn checked_out(&self) -> u32 {
        self.connections.len() as u32 - self.idle.len() as u32
    }

    fn take_failure(&mut self, sql: &str) -> Option<String> {
        let idx = self
            .failures
            .iter()
            .position(|failure| sql.contains(&failure.pattern))?;
        if self.failures[idx].once {
            Some(self.failures.remove(idx).message)
        } else {
            Some(self.failures[idx].message.clone())
        }
    }

    fn deliver(&self, from: u32, channel: &str, payload: &str) {
        for conn in self.connections.values() {
            if conn.listening.contains(channel) {
                let _ = conn.sender.send(Notification {
                    process_id: from,
                    channel: channel.to_string(),
                    payload: payload.to_string(),
                });
            }
        }
    }
}

/// In-memory connection pool for tests.
///
/// Cloning shares the same underlying "database": statement log, canned
/// responses, listeners, and pool accounting.
#[derive(Clone)]
pub struct MockPool {
    state: Arc<Mutex<State>>,
}

impl MockPool {
    /// Create a pool holding at most `max_size` physical connections.
    pub fn new(max_size: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                max_size,
                ..State::default()
            })),
        }
    }

    /// This pool as a trait object, ready to hand to a session.
    pub fn shared(&self) -> Arc<dyn ConnectionPool> {
        Arc::new(self.clone())
    }

    /// Serve `rows` whenever a statement equal to `sql` (ignoring surrounding
    /// whitespace) is executed.
    pub fn respond(&self, sql: &str, rows: Vec<Row>) {
        self.lock().responses.push((sql.trim().to_string(), rows));
    }

    /// Fail every statement containing `pattern` with `message`.
    pub fn fail_on(&self, pattern: &str, message: &str) {
        self.push_failure(pattern, message, false);
    }

    /// Fail the next statement containing `pattern` with `message`.
    pub fn fail_once(&self, pattern: &str, message: &str) {
        self.push_failure(pattern, message, true);
    }

    fn push_failure(&self, pattern: &str, message: &str, once: bool) {
        self.lock().failures.push(Failure {
            pattern: pattern.to_string(),
            message: message.to_string(),
            once,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Make every following `acquire` fail with `message` (`None` to stop).
    pub fn fail_acquire(&self, message: Option<&str>) {
        self.lock().acquire_failure = message.map(str::to_string);
    }

    /// Deliver a notification as if another client ran `NOTIFY`.
    pub fn notify(&self, channel: &str, payload: &str) {
        self.lock().deliver(0, channel, payload);
    }

    /// SQL text of every statement executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// Every statement executed so far, with connection ids and parameters.
    pub fn statement_log(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    pub fn clear_statements(&self) {
        self.lock().statements.clear();
    }

    /// Channels the given connection is currently listening on.
    pub fn listening(&self, connection: u32) -> Vec<String> {
        let state = self.lock();
        let mut channels: Vec<String> = state
            .connections
            .get(&connection)
            .map(|conn| conn.listening.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    /// Connections currently checked out.
    pub fn checked_out(&self) -> u32 {
        self.lock().checked_out()
    }

    pub fn acquire_count(&self) -> usize {
        self.lock().acquired
    }

    pub fn release_count(&self) -> usize {
        self.lock().released
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn acquire(&self) -> Result<Acquired, BoxError> {
        let (id, generation) = {
            let mut state = self.lock();
            if let Some(message) = &state.acquire_failure {
                return Err(Box::new(MockError(message.clone())));
            }
            let id = match state.idle.pop() {
                Some(id) => id,
                None if (state.connections.len() as u32) < state.max_size => {
                    state.next_id += 1;
                    let id = state.next_id;
                    state.connections.insert(id, ConnState::new());
                    id
                }
                None => {
                    return Err(Box::new(MockError(format!(
                        "pool exhausted: {} of {} connections checked out",
                        state.checked_out(),
                        state.max_size
                    ))))
                }
            };
            state.acquired += 1;
            let generation = state.connections.get(&id).map_or(0, |conn| conn.generation);
            (id, generation)
        };
        tracing::trace!(connection = id, "mock connection checked out");

        let release_state = self.state.clone();
        Ok(Acquired {
            connection: Arc::new(MockConnection {
                id,
                generation,
                state: self.state.clone(),
            }),
            release: Box::new(move || {
                let mut state = lock(&release_state);
                match state.connections.get_mut(&id) {
                    Some(conn) if conn.generation == generation => conn.reset(),
                    _ => return,
                }
                state.idle.push(id);
                state.released += 1;
            }),
        })
    }

    fn status(&self) -> PoolStatus {
        let state = self.lock();
        PoolStatus {
            size: state.connections.len() as u32,
            idle: state.idle.len() as u32,
            max_size: state.max_size,
        }
    }
}

struct MockConnection {
    id: u32,
    generation: u64,
    state: Arc<Mutex<State>>,
}

impl MockConnection {
    fn is_current(&self, state: &State) -> bool {
        state
            .connections
            .get(&self.id)
            .is_some_and(|conn| conn.generation == self.generation)
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, MockError> {
        let mut state = lock(&self.state);
        if !self.is_current(&state) {
            return Err(MockError("connection released".into()));
        }
        state.statements.push(Statement {
            connection: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        if let Some(message) = state.take_failure(sql) {
            return Err(MockError(message));
        }

        let command = parse_command(sql);
        let id = self.id;
        let mut delivered = Vec::new();
        {
            let Some(conn) = state.connections.get_mut(&id) else {
                return Err(MockError(format!("connection {id} is closed")));
            };
            match &command {
                Command::Begin => conn.in_transaction = true,
                Command::Commit => {
                    conn.in_transaction = false;
                    delivered = std::mem::take(&mut conn.pending);
                }
                Command::Rollback => {
                    conn.in_transaction = false;
                    conn.pending.clear();
                }
                Command::Listen(channel) => {
                    conn.listening.insert(channel.clone());
                }
                Command::Unlisten(Some(channel)) => {
                    conn.listening.remove(channel);
                }
                Command::Unlisten(None) => conn.listening.clear(),
                Command::Notify { channel, payload } => {
                    let notification = (channel.clone(), payload.clone().unwrap_or_default());
                    if conn.in_transaction {
                        conn.pending.push(notification);
                    } else {
                        delivered.push(notification);
                    }
                }
                Command::Other { .. } => {}
            }
        }
        for (channel, payload) in &delivered {
            state.deliver(id, channel, payload);
        }

        let rows = state
            .responses
            .iter()
            .find(|(expected, _)| expected == sql.trim())
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(QueryOutput {
            rows_affected: Some(rows.len() as u64),
            command: Some(command.tag().to_string()),
            rows,
        })
    }
}

#[async_trait]
impl PhysicalConnection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, BoxError> {
        self.run(sql, params).map_err(|err| Box::new(err) as BoxError)
    }

    fn submit(&self, sql: String) {
        if let Err(err) = self.run(&sql, &[]) {
            tracing::error!(error = %err, sql = %sql, "queued statement failed");
        }
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        let state = lock(&self.state);
        match state.connections.get(&self.id) {
            Some(conn) if conn.generation == self.generation => conn.sender.subscribe(),
            _ => broadcast::channel(1).1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn acquire_and_release_restore_idle_count() {
        let pool = MockPool::new(2);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.checked_out(), 2);
        assert!(pool.acquire().await.is_err());

        (a.release)();
        (b.release)();
        assert_eq!(pool.status(), PoolStatus { size: 2, idle: 2, max_size: 2 });
        assert_eq!(pool.release_count(), 2);
    }

    #[tokio::test]
    async fn released_connection_is_reused_and_forgets_listens() {
        let pool = MockPool::new(1);
        let first = pool.acquire().await.unwrap();
        first.connection.query("LISTEN \"test\"", &[]).await.unwrap();
        assert_eq!(pool.listening(1), vec!["test"]);
        (first.release)();

        let second = pool.acquire().await.unwrap();
        assert!(pool.listening(1).is_empty());
        assert_eq!(pool.status().size, 1);
        (second.release)();
    }

    #[tokio::test]
    async fn notify_reaches_listening_connections_only() {
        let pool = MockPool::new(3);
        let listener = pool.acquire().await.unwrap();
        let bystander = pool.acquire().await.unwrap();
        let sender = pool.acquire().await.unwrap();
        let mut listener_rx = listener.connection.notifications();
        let mut bystander_rx = bystander.connection.notifications();

        listener.connection.query("LISTEN \"test\"", &[]).await.unwrap();
        sender.connection.query("NOTIFY \"test\", '[1]'", &[]).await.unwrap();

        let received = listener_rx.recv().await.unwrap();
        assert_eq!(received.channel, "test");
        assert_eq!(received.payload, "[1]");
        assert!(bystander_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_inside_transaction_waits_for_commit() {
        let pool = MockPool::new(2);
        let listener = pool.acquire().await.unwrap();
        let sender = pool.acquire().await.unwrap();
        let mut rx = listener.connection.notifications();
        listener.connection.query("LISTEN \"test\"", &[]).await.unwrap();

        sender.connection.query("BEGIN", &[]).await.unwrap();
        sender.connection.query("NOTIFY \"test\", 'dropped'", &[]).await.unwrap();
        sender.connection.query("ROLLBACK", &[]).await.unwrap();
        assert!(rx.try_recv().is_err());

        sender.connection.query("BEGIN", &[]).await.unwrap();
        sender.connection.query("NOTIFY \"test\", 'kept'", &[]).await.unwrap();
        assert!(rx.try_recv().is_err());
        sender.connection.query("COMMIT", &[]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().payload, "kept");
    }

    #[tokio::test]
    async fn canned_rows_and_failures() {
        let pool = MockPool::new(1);
        pool.respond("SELECT 1", vec![crate::row! { "one" => 1 }]);
        pool.fail_once("INSERT", "duplicate key value violates unique constraint");
        let conn = pool.acquire().await.unwrap();

        let out = conn.connection.query(" SELECT 1 ", &[json!(5)]).await.unwrap();
        assert_eq!(out.rows[0]["one"], 1);
        assert_eq!(out.command.as_deref(), Some("SELECT"));

        let err = conn.connection.query("INSERT INTO t VALUES (1)", &[]).await.unwrap_err();
        assert!(err.to_string().contains("unique constraint"));
        assert!(conn.connection.query("INSERT INTO t VALUES (1)", &[]).await.is_ok());

        assert_eq!(pool.statement_log()[0].params, vec![json!(5)]);
        (conn.release)();
    }

    #[tokio::test]
    async fn released_handle_rejects_statements() {
        let pool = MockPool::new(1);
        let first = pool.acquire().await.unwrap();
        let stale = first.connection.clone();
        (first.release)();
        let second = pool.acquire().await.unwrap();
        second.connection.query("LISTEN \"live\"", &[]).await.unwrap();
        pool.clear_statements();

        let err = stale.query("UNLISTEN *", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "connection released");
        stale.submit("UNLISTEN \"live\"".to_string());

        assert!(pool.statements().is_empty());
        assert_eq!(pool.listening(1), vec!["live"]);
        (second.release)();
    }

    #[tokio::test]
    async fn submitted_statement_runs_before_later_queries() {
        let pool = MockPool::new(1);
        let conn = pool.acquire().await.unwrap();
        conn.connection.query("LISTEN \"jobs\"", &[]).await.unwrap();

        conn.connection.submit("UNLISTEN \"jobs\"".to_string());
        conn.connection.query("LISTEN \"jobs\"", &[]).await.unwrap();

        assert_eq!(
            pool.statements(),
            ["LISTEN \"jobs\"", "UNLISTEN \"jobs\"", "LISTEN \"jobs\""]
        );
        assert_eq!(pool.listening(1), vec!["jobs"]);
        (conn.release)();
    }

    #[tokio::test]
    async fn acquire_failure_injection() {
        let pool = MockPool::new(1);
        pool.fail_acquire(Some("connection refused"));
        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        pool.fail_acquire(None);
        assert!(pool.acquire().await.is_ok());
    }
}
