//! Pool and driver collaborator traits.
//!
//! A session never talks to a wire protocol directly. It asks a
//! [`ConnectionPool`] for a connection, runs statements through the
//! [`PhysicalConnection`] it got back, and hands the connection back through
//! the one-shot [`Release`] callback. `pgsession-sqlx` implements these traits
//! on top of `sqlx`; `pgsession-test` provides an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::BoxError;

/// One result row: column name to decoded value, in column order.
pub type Row = serde_json::Map<String, Value>;

/// Everything a driver reports for one statement.
///
/// Sessions only surface `rows`; the rest is available to drivers and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// Command tag (e.g. `"INSERT"`), when the driver reports one.
    pub command: Option<String>,
    pub rows_affected: Option<u64>,
}

impl QueryOutput {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

/// A server-pushed `NOTIFY` event as delivered by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub process_id: u32,
    pub channel: String,
    pub payload: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            process_id: 0,
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// A single physical connection checked out of a pool.
///
/// Implementations serialize statements internally, so `query` takes `&self`
/// and the connection can be shared between a session and its notification
/// forwarder.
#[async_trait]
pub trait PhysicalConnection: Send + Sync {
    /// Execute one statement with positional parameters.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, BoxError>;

    /// Queue a parameterless statement without waiting for it.
    ///
    /// The statement is ordered before any `query` started after this call
    /// returns. Its failure is logged by the implementation, not reported.
    fn submit(&self, sql: String);

    /// Subscribe to notifications received on this connection.
    fn notifications(&self) -> broadcast::Receiver<Notification>;
}

/// Callback returning a connection to its pool. Called at most once.
pub type Release = Box<dyn FnOnce() + Send>;

/// A connection handed out by [`ConnectionPool::acquire`] together with
/// the callback that gives it back.
pub struct Acquired {
    pub connection: Arc<dyn PhysicalConnection>,
    pub release: Release,
}

impl std::fmt::Debug for Acquired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquired").finish_non_exhaustive()
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Physical connections currently open (idle or checked out).
    pub size: u32,
    /// Connections available for immediate checkout without opening a new one.
    pub idle: u32,
    pub max_size: u32,
}

impl PoolStatus {
    /// Connections a caller could still check out: idle ones plus the
    /// headroom up to `max_size`.
    pub fn available(&self) -> u32 {
        self.idle + self.max_size.saturating_sub(self.size)
    }
}

/// A bounded pool of physical connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Check out a connection, waiting for one to free up if necessary.
    async fn acquire(&self) -> Result<Acquired, BoxError>;

    fn status(&self) -> PoolStatus;
}
