/// Failure of a statement sent to a [`SqlxPool`](crate::SqlxPool) connection.
#[derive(Debug)]
pub enum BackendError {
    /// The connection's worker has stopped: the connection was released or
    /// its listener failed.
    ConnectionClosed,
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::ConnectionClosed => write!(f, "Connection closed"),
            BackendError::Sqlx(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Sqlx(err) => Some(err),
            BackendError::ConnectionClosed => None,
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        BackendError::Sqlx(err)
    }
}

impl BackendError {
    /// The SQLSTATE code reported by the server, if the failure came from one.
    pub fn code(&self) -> Option<String> {
        match self {
            BackendError::Sqlx(sqlx::Error::Database(db)) => db.code().map(|code| code.into_owned()),
            _ => None,
        }
    }

    /// Whether the failure left the connection unusable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectionClosed
                | BackendError::Sqlx(
                    sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::WorkerCrashed
                )
        )
    }
}
