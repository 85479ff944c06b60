//! Wire protocol of the agent: JSON-RPC 2.0 over NDJSON.
//!
//! Message envelopes and error codes are shared with the core crate;
//! method parameter and result shapes live in [`methods`].

pub mod methods;

pub use fsrelay_core::protocol::{errors, messages};
