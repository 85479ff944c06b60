use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handler::dispatch::Dispatcher;
use crate::io::transport::run_transport_loop;
use crate::protocol::messages::JsonRpcNotification;
use crate::registry::{shutdown_drivers, DriverMap};

/// Run the NDJSON stdio transport loop.
///
/// Reads JSON-RPC messages from stdin (one per line) and writes
/// responses to stdout. Logs go to stderr. Every open file is closed
/// once stdin reaches EOF or `shutdown` fires.
pub async fn run_stdio_loop(
    drivers: Arc<DriverMap>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (notification_tx, mut notification_rx) =
        tokio::sync::mpsc::unbounded_channel::<JsonRpcNotification>();
    let dispatcher = Arc::new(Dispatcher::new(drivers.clone(), notification_tx));

    let reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    info!("Stdio transport loop started, waiting for input");

    let result = run_transport_loop(
        reader,
        &mut stdout,
        dispatcher,
        &mut notification_rx,
        shutdown,
    )
    .await;

    info!("Stdin closed, closing open files");
    shutdown_drivers(&drivers).await;
    result
}
