//! Per-driver access level and the mutation gate.

use serde::{Deserialize, Serialize};

use crate::errors::DriverError;

/// Access level fixed when a driver is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "readWrite",
        }
    }

    /// Fail with [`DriverError::PermissionDenied`] when `operation` would
    /// mutate state under a read-only level.
    ///
    /// Must be called before any I/O is attempted.
    pub fn check_mutation(&self, operation: &str) -> Result<(), DriverError> {
        match self {
            Self::Read => Err(DriverError::PermissionDenied(operation.to_string())),
            Self::Write | Self::ReadWrite => Ok(()),
        }
    }
}
