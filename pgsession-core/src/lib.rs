//! # pgsession-core
//!
//! Shared building blocks for the pgsession crates:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`config`] | YAML / `.env` / environment configuration and the typed [`DatabaseConfig`] section |
//! | [`error`] | [`SessionError`], the error taxonomy surfaced by every session operation |
//! | [`driver`] | [`ConnectionPool`] and [`PhysicalConnection`], the seams a database driver plugs into |
//! | [`logging`] | [`init_tracing`](logging::init_tracing) subscriber bootstrap |

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;

pub use config::{Config, ConfigError, ConfigProperties, ConfigValue, DatabaseConfig, FromConfigValue};
pub use driver::{
    Acquired, ConnectionPool, Notification, PhysicalConnection, PoolStatus, QueryOutput, Release,
    Row,
};
pub use error::{BoxError, SessionError, SessionResult};

pub mod prelude {
    //! Re-exports of the most commonly used core types.
    pub use crate::{
        Config, ConnectionPool, DatabaseConfig, Notification, PhysicalConnection, Row,
        SessionError, SessionResult,
    };
}
