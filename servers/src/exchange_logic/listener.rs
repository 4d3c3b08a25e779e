use crate::exchange_logic::protocol;
use lib_exchange::ExchangeSocket;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Exchange server listening on {}", addr);
    Ok(listener)
}

/// Accepts clients until the shutdown signal fires.
pub async fn run(listener: TcpListener, socket: Arc<ExchangeSocket>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
                        log::info!("Client {} connected from {}", client_id, peer);
                        tokio::spawn(handle_client(client_id, stream, Arc::clone(&socket), shutdown.resubscribe()));
                    }
                    Err(e) => log::error!("Failed to accept connection: {}", e),
                }
            }
            _ = shutdown.recv() => {
                log::info!("Listener shutting down.");
                break;
            }
        }
    }
}

async fn handle_client(
    client_id: usize,
    stream: TcpStream,
    socket: Arc<ExchangeSocket>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let response = protocol::handle_line(&socket, &line).await;
                        let mut out = match serde_json::to_string(&response) {
                            Ok(out) => out,
                            Err(e) => {
                                log::error!("Client {}: failed to encode response: {}", client_id, e);
                                break;
                            }
                        };
                        out.push('\n');
                        if let Err(e) = write_half.write_all(out.as_bytes()).await {
                            log::warn!("Client {}: write failed: {}", client_id, e);
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Client {}: read failed: {}", client_id, e);
                        break;
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    log::info!("Client {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_exchange::{ExchangeCore, OverflowPolicy, RingStore};

    #[tokio::test]
    async fn serves_json_lines_over_tcp() {
        let socket = Arc::new(ExchangeSocket::new());
        socket
            .bind(Arc::new(ExchangeCore::new("tcp", RingStore::new(8, OverflowPolicy::None).unwrap())))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let server = tokio::spawn(run(listener, Arc::clone(&socket), shutdown_tx.subscribe()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut replies = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"op\":\"publish\",\"key\":10,\"payload\":\"a\"}\n{\"op\":\"range\",\"start\":0,\"end\":99}\n")
            .await
            .unwrap();

        let first: serde_json::Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["status"], "ok");
        let second: serde_json::Value = serde_json::from_str(&replies.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["count"], 1);
        assert_eq!(second["messages"][0]["key"], 10);

        shutdown_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
