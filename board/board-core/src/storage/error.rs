//! Storage errors shared by every backend.

use crate::model::{EntityKind, UserId};

/// Result alias for repository operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the query builder and the storage backends.
///
/// Backends never retry. A driver failure is wrapped with the operation
/// that produced it and returned as one of the fault variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Malformed filter, sort, pagination or payload input.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name as the client spelled it
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind looked up
        entity: EntityKind,
        /// Identifier looked up
        id: i64,
    },

    /// A referenced entity does not exist.
    #[error("referenced {entity} {id} does not exist")]
    ReferenceNotFound {
        /// Entity kind referenced
        entity: EntityKind,
        /// Identifier referenced
        id: i64,
    },

    /// Another user already holds this login.
    #[error("login {login:?} is already taken")]
    LoginTaken {
        /// The conflicting login
        login: String,
    },

    /// The backend could not be reached.
    #[error("connection error: {message}")]
    Connection {
        /// Driver message
        message: String,
    },

    /// A read failed inside the backend.
    #[error("{operation} read failed: {message}")]
    Read {
        /// Repository operation
        operation: &'static str,
        /// Driver message
        message: String,
    },

    /// A write failed inside the backend.
    #[error("{operation} write failed: {message}")]
    Write {
        /// Repository operation
        operation: &'static str,
        /// Driver message
        message: String,
    },

    /// Unexpected data or state, e.g. a row that does not decode.
    #[error("internal storage error: {message}")]
    Internal {
        /// Description
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Repository operation
        operation: &'static str,
    },

    /// The operation did not finish before its deadline.
    #[error("{operation} exceeded its deadline ({timeout_ms} ms)")]
    DeadlineExceeded {
        /// Repository operation
        operation: &'static str,
        /// Effective budget in milliseconds
        timeout_ms: u64,
    },
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client sent bad input
    InvalidParameter,
    /// Entity missing
    NotFound,
    /// Foreign reference missing
    ReferenceNotFound,
    /// Uniqueness violated
    Conflict,
    /// Backend fault
    Storage,
    /// Caller cancelled
    Cancelled,
    /// Deadline elapsed
    DeadlineExceeded,
}

impl StorageError {
    /// Invalid parameter error.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Missing user.
    #[must_use]
    pub fn user_not_found(id: UserId) -> Self {
        Self::NotFound {
            entity: EntityKind::User,
            id: id.get(),
        }
    }

    /// Missing referenced user.
    #[must_use]
    pub fn user_reference_not_found(id: UserId) -> Self {
        Self::ReferenceNotFound {
            entity: EntityKind::User,
            id: id.get(),
        }
    }

    /// Connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Read error.
    pub fn read(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Read {
            operation,
            message: message.into(),
        }
    }

    /// Write error.
    pub fn write(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Write {
            operation,
            message: message.into(),
        }
    }

    /// Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParameter { .. } => ErrorCategory::InvalidParameter,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::ReferenceNotFound { .. } => ErrorCategory::ReferenceNotFound,
            Self::LoginTaken { .. } => ErrorCategory::Conflict,
            Self::Connection { .. }
            | Self::Read { .. }
            | Self::Write { .. }
            | Self::Internal { .. } => ErrorCategory::Storage,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::DeadlineExceeded { .. } => ErrorCategory::DeadlineExceeded,
        }
    }

    /// Whether this is a backend fault worth logging as an error.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.category() == ErrorCategory::Storage
    }
}
