use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handler::dispatch::Dispatcher;
use crate::io::transport::run_transport_loop;
use crate::protocol::messages::JsonRpcNotification;
use crate::registry::{shutdown_drivers, DriverMap};

/// Run the NDJSON transport loop over a TCP listener.
///
/// Binds to `addr` and accepts one client at a time. Drivers, and with
/// them any files a client left open, are shared across connections so a
/// client can reconnect and keep using its file ids. Each connection gets
/// its own [`Dispatcher`] and must `initialize` again.
///
/// The accept loop exits when the cancellation token is triggered.
pub async fn run_tcp_listener(
    addr: &str,
    drivers: Arc<DriverMap>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    let (notification_tx, mut notification_rx) =
        tokio::sync::mpsc::unbounded_channel::<JsonRpcNotification>();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown signal received, stopping TCP listener");
                break;
            }

            accept_result = listener.accept() => {
                let (stream, peer) = accept_result?;
                info!("Client connected from {}", peer);

                // Progress of the previous client's transfers is of no use
                // to the next one.
                while notification_rx.try_recv().is_ok() {}

                let dispatcher = Arc::new(Dispatcher::new(drivers.clone(), notification_tx.clone()));
                let (reader_half, mut writer_half) = stream.into_split();

                let result = run_transport_loop(
                    BufReader::new(reader_half),
                    &mut writer_half,
                    dispatcher,
                    &mut notification_rx,
                    shutdown.child_token(),
                )
                .await;

                match result {
                    Ok(()) => info!("Client {} disconnected", peer),
                    Err(e) => warn!("Client {} error: {}", peer, e),
                }
            }
        }
    }

    info!("Shutting down, closing open files");
    shutdown_drivers(&drivers).await;

    Ok(())
}
