use std::sync::Arc;

use futures_util::future::BoxFuture;
use pgsession_core::{ConnectionPool, SessionError, SessionResult};

use crate::session::Session;

/// Threads a session through a chain of dependent operations so any failure
/// can be answered with one rollback.
///
/// ```ignore
/// let mut scope = Session::scope();
/// let session = scope.attach(Session::begin(pool).await?);
/// if let Err(err) = session.query(sql, &params).await {
///     return scope.rollback(err).await;
/// }
/// scope.commit().await?;
/// ```
#[derive(Debug, Default)]
pub struct Scope {
    session: Option<Session>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` in the scope and hand it back for further use.
    ///
    /// A session attached earlier is replaced; it is dropped, which releases
    /// its connection if it still holds one.
    pub fn attach(&mut self, session: Session) -> &mut Session {
        self.session.insert(session)
    }

    pub fn session(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Remove the session from the scope.
    pub fn take(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Roll back the attached session, if any, and return `err` unchanged.
    ///
    /// A failing `ROLLBACK` is logged; the caller still gets `err`.
    pub async fn rollback<T, E>(&mut self, err: E) -> Result<T, E> {
        if let Some(mut session) = self.session.take() {
            if let Err(rollback_err) = session.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed while unwinding a scope");
            }
        }
        Err(err)
    }

    /// Commit the attached session.
    ///
    /// # Errors
    ///
    /// `Disconnected` if no session is attached, otherwise whatever
    /// [`Session::commit`] returns. The session stays attached on failure.
    pub async fn commit(&mut self) -> SessionResult<()> {
        match self.session.as_mut() {
            Some(session) => {
                session.commit().await?;
                self.session = None;
                Ok(())
            }
            None => Err(SessionError::Disconnected),
        }
    }
}

impl Session {
    /// A fresh, empty [`Scope`].
    pub fn scope() -> Scope {
        Scope::new()
    }

    /// Run `f` inside a transaction on a new session.
    ///
    /// Commits when `f` returns `Ok`; rolls back and returns the error
    /// unchanged when it returns `Err`. A failing `COMMIT` is converted with
    /// `E::from` after the session has been rolled back.
    ///
    /// ```ignore
    /// let rows = Session::transaction(pool, |session| {
    ///     Box::pin(async move { session.query("SELECT 1", &[]).await })
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<T, E, F>(pool: Arc<dyn ConnectionPool>, f: F) -> Result<T, E>
    where
        E: From<SessionError>,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
    {
        let mut scope = Session::scope();
        let session = scope.attach(Session::begin(pool).await?);

        let value = match f(session).await {
            Ok(value) => value,
            Err(err) => return scope.rollback(err).await,
        };
        match scope.commit().await {
            Ok(()) => Ok(value),
            Err(err) => scope.rollback(E::from(err)).await,
        }
    }
}
