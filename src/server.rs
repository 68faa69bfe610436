//! TCP accept loop shared by the coordinator and the storage nodes
//!
//! Every accepted connection gets its own task; the loop never waits on a
//! worker. The loop ends when the shutdown future resolves, leaving
//! in-flight connections to finish on their own.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accept connections until `shutdown` resolves
pub async fn serve<H, Fut, S>(
    listener: TcpListener,
    role: &'static str,
    handler: H,
    shutdown: S,
) -> io::Result<()>
where
    H: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
    S: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    info!(role, addr = %addr, "Listening");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(role, "Shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(role, peer = %peer, "Accepted connection");
                    tokio::spawn(handler(stream, peer));
                }
                Err(e) => warn!(role, error = %e, "Accept failed"),
            },
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down gracefully...");
}
