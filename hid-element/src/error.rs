//! Element layer error types

use thiserror::Error;

use crate::status::Status;

/// Errors that can occur during queue and transaction operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidError {
    /// The transport reported a non-success status
    #[error("transport error: {0}")]
    Status(Status),

    /// An asynchronous commit was requested before scheduling on an event source
    #[error("transaction is not scheduled on an event source")]
    NotScheduled,
}

impl HidError {
    /// Status code equivalent of this error
    pub fn status(&self) -> Status {
        match self {
            HidError::Status(status) => *status,
            HidError::NotScheduled => Status::NotReady,
        }
    }

    /// Whether this error is the expected timeout outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, HidError::Status(Status::Timeout))
    }
}

impl From<Status> for HidError {
    fn from(status: Status) -> Self {
        HidError::Status(status)
    }
}
