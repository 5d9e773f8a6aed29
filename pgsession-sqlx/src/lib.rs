//! # pgsession-sqlx
//!
//! PostgreSQL backend for `pgsession` on [SQLx](https://github.com/launchbadge/sqlx).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxPool`] | [`ConnectionPool`](pgsession_core::ConnectionPool) over a `PgPool`, sized from [`DatabaseConfig`](pgsession_core::DatabaseConfig) |
//! | [`PoolRegistry`] | Pools keyed by connection URL, so sessions for one database share a pool |
//! | [`BackendError`] | Statement failures surfaced through `SessionError::Query` |
//!
//! Checked-out connections are `PgListener`s driven by a worker task: the
//! session's statements and the server's notifications share one physical
//! connection, as `LISTEN` requires.
//!
//! Parameters bind from JSON (`null`, booleans, `i64`, `f64`, text, and
//! arrays/objects as `json`). Result columns decode to JSON by type; types
//! without a dedicated mapping come back as their text form when the server
//! sent text, else `null`.
//!
//! ```ignore
//! use pgsession::Session;
//! use pgsession_core::{Config, DatabaseConfig};
//! use pgsession_sqlx::PoolRegistry;
//!
//! let config = Config::load("dev")?.with_typed::<DatabaseConfig>()?;
//! let registry = PoolRegistry::new();
//! let pool = registry.get_or_connect(config.typed()).await?;
//!
//! let mut session = Session::begin(pool.shared()).await?;
//! let rows = session.query("SELECT * FROM accounts WHERE id = $1", &[1.into()]).await?;
//! session.commit().await?;
//! ```

mod connection;
mod convert;
pub mod error;
mod pool;

pub use error::BackendError;
pub use pool::{PoolRegistry, SqlxPool};
