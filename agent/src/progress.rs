//! Transfer progress notifications and cancellation.
//!
//! An `httpRequest` whose options carry a `transferId` gets a
//! [`NotifyingListener`]: every progress sample becomes a
//! `transfer.progress` notification, and `transfer.cancel` flips the
//! transfer's token so the next sample aborts it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fsrelay_core::http::ProgressListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::io::transport::NotificationSender;
use crate::protocol::messages::JsonRpcNotification;
use crate::protocol::methods::{TransferDirection, TransferProgressParams};

/// Live transfers by id.
#[derive(Default)]
pub struct TransferRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transfer_id`, replacing an earlier transfer with that id.
    pub fn register(&self, transfer_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut tokens) = self.tokens.lock() {
            if tokens.insert(transfer_id.to_string(), token.clone()).is_some() {
                warn!("Transfer id {} reused while still active", transfer_id);
            }
        }
        token
    }

    pub fn finish(&self, transfer_id: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(transfer_id);
        }
    }

    /// Cancel `transfer_id`. Returns `false` when no such transfer is live.
    pub fn cancel(&self, transfer_id: &str) -> bool {
        let token = match self.tokens.lock() {
            Ok(tokens) => tokens.get(transfer_id).cloned(),
            Err(_) => None,
        };
        match token {
            Some(token) => {
                debug!("Cancelling transfer {}", transfer_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// Forwards progress samples as notifications and aborts once cancelled.
pub struct NotifyingListener {
    transfer_id: String,
    sender: NotificationSender,
    token: CancellationToken,
}

impl NotifyingListener {
    pub fn new(transfer_id: String, sender: NotificationSender, token: CancellationToken) -> Self {
        Self {
            transfer_id,
            sender,
            token,
        }
    }

    fn report(&self, direction: TransferDirection, transferred: u64, total: Option<u64>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let params = TransferProgressParams {
            transfer_id: self.transfer_id.clone(),
            direction,
            transferred,
            total,
        };
        match serde_json::to_value(params) {
            Ok(params) => {
                // The client may be gone; the transfer keeps going regardless.
                let _ = self
                    .sender
                    .send(JsonRpcNotification::new("transfer.progress", params));
            }
            Err(e) => warn!("Failed to serialize progress notification: {}", e),
        }
        true
    }
}

impl ProgressListener for NotifyingListener {
    fn on_download_progress(&self, received: u64, total: Option<u64>) -> bool {
        self.report(TransferDirection::Download, received, total)
    }

    fn on_upload_progress(&self, sent: u64, total: u64) -> bool {
        self.report(TransferDirection::Upload, sent, Some(total))
    }
}
