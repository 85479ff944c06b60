use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::permission::Permission;

/// Construction-time configuration of one driver instance.
///
/// - `name`: the name callers use to address the driver.
/// - `path`: base directory every logical path is rooted at.
/// - `permissions`: access level, `readWrite` when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub permissions: Permission,
}

impl DriverConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, permissions: Permission) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            permissions,
        }
    }
}
