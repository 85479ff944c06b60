use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use fsrelay_core::http::ProgressListener;
use fsrelay_core::{CommandEnvelope, DriverError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::io::transport::NotificationSender;
use crate::progress::{NotifyingListener, TransferRegistry};
use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::methods::{
    DriverCommandParams, DriverListEntry, DriverListResult, HealthCheckResult, InitializeParams,
    InitializeResult, TransferCancelParams, TransferCancelResult,
};
use crate::registry::DriverMap;

/// The agent's protocol version.
const AGENT_PROTOCOL_VERSION: &str = "0.1.0";

/// Dispatcher handles incoming JSON-RPC requests and routes them
/// to the appropriate handler function.
///
/// Shared between the request tasks of one connection; `initialize` must
/// complete before any other method is accepted.
pub struct Dispatcher {
    drivers: Arc<DriverMap>,
    transfers: TransferRegistry,
    notifications: NotificationSender,
    initialized: AtomicBool,
    start_time: Instant,
}

/// The result of dispatching a request: either a success or error response.
pub enum DispatchResult {
    Success(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl DispatchResult {
    /// Serialize the result to a JSON `Value`.
    pub fn to_json(&self) -> Value {
        let serialized = match self {
            Self::Success(resp) => serde_json::to_value(resp),
            Self::Error(resp) => serde_json::to_value(resp),
        };
        serialized.unwrap_or_else(|e| {
            json!({
                "jsonrpc": "2.0",
                "error": {"code": errors::INTERNAL_ERROR, "message": e.to_string()},
                "id": Value::Null,
            })
        })
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::Error(JsonRpcErrorResponse::new(id, code, message))
    }
}

fn success<T: Serialize>(id: Value, result: T) -> DispatchResult {
    match serde_json::to_value(result) {
        Ok(value) => DispatchResult::Success(JsonRpcResponse::new(id, value)),
        Err(e) => DispatchResult::error(id, errors::INTERNAL_ERROR, e.to_string()),
    }
}

/// Map a driver failure to its JSON-RPC error. I/O errors carry their
/// native kind in `data`.
fn driver_error(id: Value, err: DriverError) -> DispatchResult {
    let response = JsonRpcErrorResponse::new(id, err.rpc_code(), err.to_string());
    let response = match &err {
        DriverError::Io(io) => response.with_data(json!({ "io_kind": format!("{:?}", io.kind()) })),
        _ => response,
    };
    DispatchResult::Error(response)
}

impl Dispatcher {
    pub fn new(drivers: Arc<DriverMap>, notifications: NotificationSender) -> Self {
        Self {
            drivers,
            transfers: TransferRegistry::new(),
            notifications,
            initialized: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    /// Dispatch a parsed JSON-RPC request to the appropriate handler.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let method = request.method.as_str();

        debug!("Dispatching method: {}", method);

        // The `initialize` method is always allowed
        if method == "initialize" {
            return self.handle_initialize(request);
        }

        // All other methods require initialization
        if !self.initialized.load(Ordering::Acquire) {
            return DispatchResult::error(
                id,
                errors::NOT_INITIALIZED,
                "Agent not initialized, call 'initialize' first",
            );
        }

        match method {
            "health.check" => self.handle_health_check(request).await,
            "driver.list" => self.handle_driver_list(request),
            "driver.command" => self.handle_driver_command(request).await,
            "transfer.cancel" => self.handle_transfer_cancel(request),
            _ => {
                warn!("Unknown method: {}", method);
                DispatchResult::error(
                    id,
                    errors::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
            }
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();

        let params: InitializeParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid initialize params: {e}"),
                );
            }
        };

        // Version negotiation: we only support major version 0
        let major = params
            .protocol_version
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok());

        if major != Some(0) {
            return DispatchResult::error(
                id,
                errors::VERSION_NOT_SUPPORTED,
                format!(
                    "Unsupported protocol version: {} (agent supports 0.x)",
                    params.protocol_version
                ),
            );
        }

        info!(
            "Initialized by {} {} (protocol {})",
            params.client, params.client_version, params.protocol_version
        );
        self.initialized.store(true, Ordering::Release);

        success(
            id,
            InitializeResult {
                protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                drivers: self.drivers.keys().cloned().collect(),
            },
        )
    }

    async fn handle_health_check(&self, request: JsonRpcRequest) -> DispatchResult {
        let mut open_files = 0;
        for driver in self.drivers.values() {
            open_files += driver.registry().len().await;
        }
        success(
            request.id,
            HealthCheckResult {
                status: "ok".to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                open_files,
            },
        )
    }

    fn handle_driver_list(&self, request: JsonRpcRequest) -> DispatchResult {
        let drivers = self
            .drivers
            .values()
            .map(|d| DriverListEntry {
                name: d.name().to_string(),
                path: d.base_path().display().to_string(),
                permissions: d.permissions().as_str().to_string(),
            })
            .collect();
        success(request.id, DriverListResult { drivers })
    }

    async fn handle_driver_command(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();

        let params: DriverCommandParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid driver.command params: {e}"),
                );
            }
        };

        let Some(driver) = self.drivers.get(&params.driver).cloned() else {
            return DispatchResult::Error(
                JsonRpcErrorResponse::new(
                    id,
                    errors::DRIVER_NOT_FOUND,
                    format!("Driver not found: {}", params.driver),
                )
                .with_data(json!({ "driver": params.driver })),
            );
        };

        let transfer_id = transfer_id(&params);
        let listener = transfer_id.as_ref().map(|transfer_id| {
            let token = self.transfers.register(transfer_id);
            Arc::new(NotifyingListener::new(
                transfer_id.clone(),
                self.notifications.clone(),
                token,
            )) as Arc<dyn ProgressListener>
        });

        let envelope = CommandEnvelope {
            cmd: params.cmd,
            server: params.server,
            args: params.args,
        };
        let result = driver.execute_with_listener(envelope, listener).await;

        if let Some(transfer_id) = &transfer_id {
            self.transfers.finish(transfer_id);
        }

        match result {
            Ok(output) => DispatchResult::Success(JsonRpcResponse::new(id, output.to_json())),
            Err(e) => {
                debug!("Command on driver '{}' failed: {}", driver.name(), e);
                driver_error(id, e)
            }
        }
    }

    fn handle_transfer_cancel(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: TransferCancelParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid transfer.cancel params: {e}"),
                );
            }
        };
        let cancelled = self.transfers.cancel(&params.transfer_id);
        success(id, TransferCancelResult { cancelled })
    }
}

/// `transferId` of an `httpRequest`'s options argument.
fn transfer_id(params: &DriverCommandParams) -> Option<String> {
    if params.cmd != "httpRequest" {
        return None;
    }
    let options = params.args.get(2)?;
    Some(options.get("transferId")?.as_str()?.to_string())
}
