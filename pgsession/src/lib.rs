//! # pgsession
//!
//! Transaction-scoped PostgreSQL sessions over a connection pool.
//!
//! A [`Session`] holds at most one pooled physical connection at a time and
//! runs every statement on it, in issue order. On top of that it offers:
//!
//! - a transaction bracket ([`Session::start`], [`Session::commit`],
//!   [`Session::rollback`]) that gives the connection back to the pool once
//!   the transaction is over;
//! - an event facade mapping [`Session::on`] / [`Session::remove_listener`] /
//!   [`Session::emit`] onto `LISTEN` / `UNLISTEN` / `NOTIFY`, with
//!   JSON-array payloads for multi-argument events and `$`-prefixed local
//!   meta channels;
//! - [`Scope`] and [`Session::transaction`] for rolling back a chain of
//!   dependent operations on the first failure.
//!
//! The pool is any [`ConnectionPool`]. `pgsession-sqlx` provides the
//! PostgreSQL one; `pgsession-test` provides an in-memory mock.
//!
//! ```ignore
//! let mut session = Session::begin(pool.clone()).await?;
//! session.on("accounts", |args| println!("{args:?}")).await?;
//! session.emit("accounts", &[json!(1), json!("opened")]).await?;
//! session.commit().await?;
//! ```

mod events;
mod forwarder;
mod scope;
mod session;
mod transaction;

pub use scope::Scope;
pub use session::Session;
pub use transaction::TransactionState;

pub use pgsession_core::logging::init_tracing;
pub use pgsession_core::{
    ConnectionPool, Notification, PoolStatus, Row, SessionError, SessionResult,
};
pub use pgsession_events::{ChannelName, ListenerId, NOTIFICATION_META};

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{
        ConnectionPool, ListenerId, Row, Scope, Session, SessionError, SessionResult,
        TransactionState,
    };
}
