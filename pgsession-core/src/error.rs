/// Boxed error returned by driver collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by session, transaction, and channel operations.
///
/// Nothing is retried internally: every variant reaches the caller as the
/// `Err` side of the operation that produced it.
#[derive(Debug)]
pub enum SessionError {
    /// `connect()` was called while the session already holds a connection.
    AlreadyConnected,
    /// A statement was issued on a session that holds no connection.
    Disconnected,
    /// The pool could not hand out a connection.
    Acquire(BoxError),
    /// The driver rejected or failed to execute a statement.
    Query { sql: String, source: BoxError },
    /// A channel name did not match `^[A-Za-z][A-Za-z0-9_]*$`.
    InvalidChannelName(String),
    /// `emit` arguments could not be encoded as a JSON array.
    Payload(serde_json::Error),
}

impl SessionError {
    pub fn query(sql: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SessionError::Query {
            sql: sql.into(),
            source: source.into(),
        }
    }

    pub fn acquire(source: impl Into<BoxError>) -> Self {
        SessionError::Acquire(source.into())
    }

    pub fn is_already_connected(&self) -> bool {
        matches!(self, SessionError::AlreadyConnected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionError::Disconnected)
    }

    pub fn is_acquire(&self) -> bool {
        matches!(self, SessionError::Acquire(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, SessionError::Query { .. })
    }

    /// The statement that failed, for `Query` errors.
    pub fn sql(&self) -> Option<&str> {
        match self {
            SessionError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AlreadyConnected => write!(f, "Session is already connected"),
            SessionError::Disconnected => write!(f, "Session is disconnected from PostgreSQL"),
            SessionError::Acquire(err) => write!(f, "Failed to acquire connection: {err}"),
            SessionError::Query { sql, source } => write!(f, "Query failed ({sql}): {source}"),
            SessionError::InvalidChannelName(name) => write!(f, "Invalid channel name: {name:?}"),
            SessionError::Payload(err) => write!(f, "Failed to encode notification payload: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Acquire(err) => Some(err.as_ref()),
            SessionError::Query { source, .. } => Some(source.as_ref()),
            SessionError::Payload(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Payload(err)
    }
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
