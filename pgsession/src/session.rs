use std::sync::Arc;

use pgsession_core::{
    ConnectionPool, PhysicalConnection, PoolStatus, QueryOutput, Release, Row, SessionError,
    SessionResult,
};
use pgsession_events::{ListenerRegistry, NotificationRouter};
use serde_json::Value;

use crate::forwarder::Forwarder;
use crate::transaction::TransactionState;

/// The connection a session currently holds.
struct Held {
    connection: Arc<dyn PhysicalConnection>,
    release: Release,
    forwarder: Forwarder,
}

impl Held {
    fn close(self) {
        self.forwarder.stop();
        (self.release)();
    }
}

/// A logical unit of work bound to at most one pooled physical connection.
///
/// A session starts disconnected. [`connect`](Session::connect) checks a
/// connection out of the pool and starts forwarding its notifications to the
/// session's listeners; [`disconnect`](Session::disconnect) gives it back.
/// Statements issued through one session run in issue order on that single
/// connection.
///
/// Dropping a session that still holds a connection releases it and logs a
/// warning.
pub struct Session {
    pool: Arc<dyn ConnectionPool>,
    held: Option<Held>,
    pub(crate) state: TransactionState,
    router: NotificationRouter,
}

impl Session {
    /// Create a disconnected session drawing connections from `pool`.
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            held: None,
            state: TransactionState::None,
            router: NotificationRouter::new(Arc::new(ListenerRegistry::new())),
        }
    }

    /// Create a session and connect it.
    pub async fn open(pool: Arc<dyn ConnectionPool>) -> SessionResult<Self> {
        let mut session = Self::new(pool);
        session.connect().await?;
        Ok(session)
    }

    /// Check a connection out of the pool.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` if this session already holds a connection,
    /// `Acquire` if the pool cannot provide one.
    pub async fn connect(&mut self) -> SessionResult<()> {
        if self.held.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let acquired = self.pool.acquire().await.map_err(SessionError::Acquire)?;
        let forwarder = Forwarder::spawn(acquired.connection.clone(), self.router.clone());
        self.held = Some(Held {
            connection: acquired.connection,
            release: acquired.release,
            forwarder,
        });
        self.state = TransactionState::None;
        tracing::debug!(pool = ?self.pool.status(), "session connected");
        Ok(())
    }

    /// Run one statement and return its rows.
    ///
    /// Command tags and affected-row counts are discarded.
    ///
    /// # Errors
    ///
    /// `Disconnected` if no connection is held, `Query` if the statement fails.
    /// A failed statement inside a transaction leaves the transaction open.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> SessionResult<Vec<Row>> {
        self.execute(sql, params).await.map(|output| output.rows)
    }

    pub(crate) async fn execute(&mut self, sql: &str, params: &[Value]) -> SessionResult<QueryOutput> {
        let connection = match &self.held {
            Some(held) => held.connection.clone(),
            None => return Err(SessionError::Disconnected),
        };
        tracing::debug!(sql, params = params.len(), "executing statement");
        connection
            .query(sql, params)
            .await
            .map_err(|source| SessionError::query(sql, source))
    }

    /// Stop forwarding notifications and return the connection to the pool.
    ///
    /// Calling this on a session without a connection logs a warning and does
    /// nothing else.
    pub fn disconnect(&mut self) -> &mut Self {
        match self.held.take() {
            Some(held) => {
                held.close();
                tracing::debug!(pool = ?self.pool.status(), "session released its connection");
            }
            None => {
                tracing::warn!("disconnect called on a session without a connection -- maybe multiple times?");
            }
        }
        self
    }

    pub fn is_connected(&self) -> bool {
        self.held.is_some()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    /// Counters of the pool this session draws from.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// The listeners registered on this session.
    pub fn listeners(&self) -> &ListenerRegistry {
        self.router.registry()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(held) = self.held.take() {
            tracing::warn!(
                state = ?self.state,
                "session dropped while holding a connection, releasing it"
            );
            held.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("state", &self.state)
            .field("listeners", self.router.registry())
            .finish()
    }
}
