//! Progress callbacks for HTTP transfers.

/// Observer of a transfer's progress. Returning `false` from either
/// callback aborts the transfer.
///
/// Callbacks run on the task driving the request, so they must not block.
pub trait ProgressListener: Send + Sync {
    /// `received` is cumulative; `total` comes from `content-length` when
    /// the server sent one.
    fn on_download_progress(&self, received: u64, total: Option<u64>) -> bool {
        let _ = (received, total);
        true
    }

    /// `sent` is the number of request body bytes handed to the transport.
    fn on_upload_progress(&self, sent: u64, total: u64) -> bool {
        let _ = (sent, total);
        true
    }
}
