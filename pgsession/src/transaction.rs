//! `BEGIN` / `COMMIT` / `ROLLBACK` on top of [`Session`].

use std::sync::Arc;

use pgsession_core::{ConnectionPool, SessionResult};

use crate::session::Session;

/// Where a session stands with respect to an explicit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No `BEGIN` issued since the session connected.
    #[default]
    None,
    Active,
    Committed,
    RolledBack,
}

impl Session {
    /// Create a session, connect it, and open a transaction.
    pub async fn begin(pool: Arc<dyn ConnectionPool>) -> SessionResult<Self> {
        let mut session = Session::new(pool);
        session.start().await?;
        Ok(session)
    }

    /// Open a transaction, connecting first if the session holds no connection.
    ///
    /// A disconnected session is connected implicitly rather than failing
    /// with [`SessionError::Disconnected`](pgsession_core::SessionError::Disconnected).
    ///
    /// If `BEGIN` fails the connection stays held; call
    /// [`disconnect`](Session::disconnect) to give it back.
    pub async fn start(&mut self) -> SessionResult<()> {
        if !self.is_connected() {
            self.connect().await?;
        }
        self.execute("BEGIN", &[]).await?;
        self.state = TransactionState::Active;
        Ok(())
    }

    /// Issue `COMMIT`, then release the connection.
    ///
    /// The connection is released only when `COMMIT` succeeds. On failure the
    /// session keeps it and the caller decides between
    /// [`rollback`](Session::rollback) and [`disconnect`](Session::disconnect).
    pub async fn commit(&mut self) -> SessionResult<()> {
        self.execute("COMMIT", &[]).await?;
        self.state = TransactionState::Committed;
        self.disconnect();
        Ok(())
    }

    /// Issue `ROLLBACK`, then release the connection.
    ///
    /// Like [`commit`](Session::commit), the connection is released only when
    /// the statement succeeds.
    pub async fn rollback(&mut self) -> SessionResult<()> {
        self.execute("ROLLBACK", &[]).await?;
        self.state = TransactionState::RolledBack;
        self.disconnect();
        Ok(())
    }
}
