//! Unified error type for the fsrelay driver core.
//!
//! Every driver operation returns [`DriverError`]. Consumers map it to their
//! own transport errors (the agent maps it to a JSON-RPC error response, see
//! [`DriverError::rpc_code`]).

use thiserror::Error;

use crate::protocol::errors;

/// Errors surfaced by driver operations and the command dispatcher.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A mutating operation was attempted on a read-only driver.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An argument had the wrong resource type, a malformed body, etc.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A read or write was attempted on a file without a live handle.
    #[error("File not open: {0}")]
    FileNotOpen(String),

    /// `write` was called without any data.
    #[error("No data to write")]
    NoData,

    /// The file or directory does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An HTTP transfer was cancelled by its progress listener.
    #[error("Transfer aborted")]
    TransferAborted,

    /// A request-level HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The zip codec rejected an archive or failed to write one.
    #[error("Archive error: {0}")]
    Archive(String),

    /// The command envelope named a command the driver does not implement.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A low-level filesystem error, passed through with native detail.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// JSON-RPC error code for this error.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::PermissionDenied(_) => errors::PERMISSION_DENIED,
            Self::InvalidArgument(_) => errors::INVALID_PARAMS,
            Self::FileNotOpen(_) => errors::FILE_NOT_OPEN,
            Self::NoData => errors::NO_DATA,
            Self::NotFound(_) => errors::FILE_NOT_FOUND,
            Self::TransferAborted => errors::TRANSFER_ABORTED,
            Self::Http(_) => errors::HTTP_ERROR,
            Self::UnknownCommand(_) => errors::METHOD_NOT_FOUND,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => errors::FILE_NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => errors::PERMISSION_DENIED,
                _ => errors::FILE_OPERATION_FAILED,
            },
            Self::Archive(_) => errors::FILE_OPERATION_FAILED,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<zip::result::ZipError> for DriverError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<walkdir::Error> for DriverError {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => Self::Io(io),
            None => Self::Io(std::io::Error::other("filesystem loop detected")),
        }
    }
}

impl From<tokio::task::JoinError> for DriverError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}
