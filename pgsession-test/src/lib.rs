//! # pgsession-test
//!
//! [`MockPool`] is an in-memory [`ConnectionPool`](pgsession_core::ConnectionPool)
//! for exercising sessions without a server. It records every statement,
//! serves canned rows, injects failures, tracks checkouts, and emulates
//! `LISTEN` / `UNLISTEN` / `NOTIFY` across all connections of the same pool,
//! including transactional delivery (notifications sent inside a transaction
//! are delivered on `COMMIT` and dropped on `ROLLBACK`).
//!
//! ```ignore
//! let pool = MockPool::new(2);
//! pool.respond("SELECT * FROM \"accounts\"", vec![row! { "id" => 1 }]);
//! let mut session = Session::begin(pool.shared()).await?;
//! let rows = session.query("SELECT * FROM \"accounts\"", &[]).await?;
//! session.commit().await?;
//! assert_eq!(pool.status().idle, 1);
//! ```

mod pool;
mod sql;

pub use pool::{MockError, MockPool, Statement};
pub use sql::{parse_command, Command};

#[doc(hidden)]
pub use pgsession_core as __core;
#[doc(hidden)]
pub use serde_json as __serde_json;

/// Build a [`Row`](pgsession_core::Row) from `column => value` pairs.
///
/// ```ignore
/// let row = row! { "id" => 1, "name" => "alice" };
/// ```
#[macro_export]
macro_rules! row {
    ($($col:expr => $val:expr),* $(,)?) => {{
        let mut row = $crate::__core::Row::new();
        $( row.insert(::std::string::String::from($col), $crate::__serde_json::json!($val)); )*
        row
    }};
}
