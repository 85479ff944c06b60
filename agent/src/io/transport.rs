use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::handler::dispatch::Dispatcher;
use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcNotification, JsonRpcRequest};

/// Maximum message size: 1 MiB.
const MAX_LINE_SIZE: usize = 1_048_576;

/// Sender half for driver tasks to emit notifications.
pub type NotificationSender = UnboundedSender<JsonRpcNotification>;

/// Run the NDJSON transport loop over arbitrary async reader/writer.
///
/// Reads JSON-RPC messages from `reader` (one per line). `initialize` is
/// handled in line; every other request runs as its own task so a slow
/// transfer does not hold up the requests behind it (including the
/// `transfer.cancel` aimed at it). Responses and notifications are written
/// only from this loop. On EOF the loop stops reading, waits for in-flight
/// requests and flushes their responses. Cancelling `shutdown` exits
/// immediately.
pub async fn run_transport_loop<R, W>(
    reader: R,
    writer: &mut W,
    dispatcher: Arc<Dispatcher>,
    notification_rx: &mut UnboundedReceiver<JsonRpcNotification>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut lines = reader.lines();
    let (response_tx, mut response_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
    let tracker = TaskTracker::new();
    let mut reading = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Shutdown signal received, exiting transport loop");
                return Ok(());
            }

            line = lines.next_line(), if reading => {
                let Some(line) = line? else {
                    debug!("Reader closed (EOF), waiting for {} in-flight requests", tracker.len());
                    reading = false;
                    tracker.close();
                    continue;
                };

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Some(request) = parse_request(writer, trimmed).await? {
                    if request.method == "initialize" {
                        let response = dispatcher.dispatch(request).await.to_json();
                        write_json(writer, &response).await?;
                        continue;
                    }
                    let dispatcher = dispatcher.clone();
                    let response_tx = response_tx.clone();
                    tracker.spawn(async move {
                        let response = dispatcher.dispatch(request).await.to_json();
                        // The loop only goes away on shutdown.
                        let _ = response_tx.send(response);
                    });
                }
            }

            Some(response) = response_rx.recv() => {
                debug!("Sending: {}", response);
                write_json(writer, &response).await?;
            }

            Some(notification) = notification_rx.recv() => {
                let json = serde_json::to_value(&notification)?;
                debug!("Sending notification: {}", json);
                write_json(writer, &json).await?;
            }

            _ = tracker.wait(), if !reading => break,
        }
    }

    while let Ok(response) = response_rx.try_recv() {
        write_json(writer, &response).await?;
    }
    Ok(())
}

/// Parse one line into a request, answering protocol errors directly.
async fn parse_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    line: &str,
) -> anyhow::Result<Option<JsonRpcRequest>> {
    if line.len() > MAX_LINE_SIZE {
        warn!("Message exceeds 1 MiB limit ({} bytes)", line.len());
        let err = JsonRpcErrorResponse::new(
            Value::Null,
            errors::PARSE_ERROR,
            "Message exceeds 1 MiB size limit",
        );
        write_json(writer, &serde_json::to_value(&err)?).await?;
        return Ok(None);
    }

    debug!("Received: {}", line);

    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to parse JSON-RPC request: {e}");
            let err = JsonRpcErrorResponse::new(
                Value::Null,
                errors::PARSE_ERROR,
                format!("Parse error: {e}"),
            );
            write_json(writer, &serde_json::to_value(&err)?).await?;
            return Ok(None);
        }
    };

    if request.jsonrpc != "2.0" {
        let err = JsonRpcErrorResponse::new(
            request.id,
            errors::INVALID_REQUEST,
            "Invalid JSON-RPC version (must be \"2.0\")",
        );
        write_json(writer, &serde_json::to_value(&err)?).await?;
        return Ok(None);
    }
    Ok(Some(request))
}

/// Write a JSON value as an NDJSON line to the writer.
pub async fn write_json<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    value: &Value,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
