use anyhow::Result;
use lib_exchange::loggers::setup_logging;
use lib_exchange::{ExchangeCore, ExchangeSocket};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

mod exchange_logic;
use exchange_logic::{config, listener};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    setup_logging(&log_dir, &log_level, "server_exchange")?;

    let exchange_config = config.exchange_config()?;
    let exchange = ExchangeCore::from_config(&exchange_config)?;
    let socket = Arc::new(ExchangeSocket::from_config(&exchange_config.socket));
    socket.bind(exchange)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let tcp = listener::bind(config.port.unwrap_or(9003)).await?;
    let listener_handle = tokio::spawn(listener::run(tcp, Arc::clone(&socket), shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    let _ = listener_handle.await;

    // Fails anything still queued and releases the exchange.
    socket.close();

    log::info!("Shutdown complete.");
    Ok(())
}
