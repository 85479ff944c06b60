//! Standard and application JSON-RPC 2.0 error codes.

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// Application error codes (fsrelay-specific).

/// No driver with the given name is configured.
pub const DRIVER_NOT_FOUND: i64 = -32001;

/// Protocol version mismatch.
pub const VERSION_NOT_SUPPORTED: i64 = -32002;

/// The agent has not been initialized yet (must call `initialize` first).
pub const NOT_INITIALIZED: i64 = -32007;

/// The file or directory was not found.
pub const FILE_NOT_FOUND: i64 = -32010;

/// A mutating operation was attempted on a read-only driver.
pub const PERMISSION_DENIED: i64 = -32011;

/// A file operation failed (I/O error, archive codec failure, etc.).
pub const FILE_OPERATION_FAILED: i64 = -32012;

/// A read or write needs an open handle and the file is not open.
pub const FILE_NOT_OPEN: i64 = -32016;

/// `write` was called without data.
pub const NO_DATA: i64 = -32017;

/// An HTTP transfer was aborted by its progress listener or a cancel call.
pub const TRANSFER_ABORTED: i64 = -32018;

/// An HTTP request failed at the transport level.
pub const HTTP_ERROR: i64 = -32019;
