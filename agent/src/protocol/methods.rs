use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── initialize ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub agent_version: String,
    /// Names of the configured drivers.
    pub drivers: Vec<String>,
}

// ── health.check ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: String,
    pub uptime_secs: u64,
    pub open_files: usize,
}

// ── driver.list ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DriverListResult {
    pub drivers: Vec<DriverListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverListEntry {
    pub name: String,
    pub path: String,
    pub permissions: String,
}

// ── driver.command ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DriverCommandParams {
    pub driver: String,
    pub cmd: String,
    #[serde(default)]
    pub server: Value,
    #[serde(default)]
    pub args: Vec<Value>,
}

// ── transfer.cancel ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TransferCancelParams {
    pub transfer_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferCancelResult {
    pub cancelled: bool,
}

// ── transfer.progress (notification) ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferProgressParams {
    pub transfer_id: String,
    pub direction: TransferDirection,
    pub transferred: u64,
    pub total: Option<u64>,
}
