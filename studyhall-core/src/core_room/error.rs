//! Error taxonomy shared by every room operation

/// Errors surfaced by room, invitation, and access-request operations
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// The referenced entity does not exist (or the room is no longer active)
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller lacks the role or relationship the operation requires.
    /// `requires_permission` tells callers the access-request path is open.
    #[error("operation not permitted")]
    Forbidden { requires_permission: bool },

    /// The request is malformed or violates a validation rule
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The operation conflicts with existing state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Code generation gave up after the bounded number of collision retries
    #[error("could not generate a unique code")]
    ExhaustedRetries,

    /// Storage or infrastructure failure; the transaction was rolled back
    #[error("internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Plain permission failure
    pub fn forbidden() -> Self {
        RoomError::Forbidden {
            requires_permission: false,
        }
    }

    /// Permission failure the caller can resolve by filing an access request
    pub fn needs_permission() -> Self {
        RoomError::Forbidden {
            requires_permission: true,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Internal failures roll back completely, so a retry observes a clean
    /// state. Business-rule failures are deterministic and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoomError::Internal(_))
    }
}

impl From<rusqlite::Error> for RoomError {
    fn from(err: rusqlite::Error) -> Self {
        RoomError::Internal(format!("sqlite: {}", err))
    }
}

impl From<r2d2::Error> for RoomError {
    fn from(err: r2d2::Error) -> Self {
        RoomError::Internal(format!("connection pool: {}", err))
    }
}
