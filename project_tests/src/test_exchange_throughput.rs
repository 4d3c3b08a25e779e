//! # Exchange Throughput Test
//!
//! Connects to a running `server_exchange`, publishes a burst of messages
//! keyed by the current timestamp and reports the acknowledged rate.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:9003")]
    addr: String,

    /// Number of messages to publish
    #[clap(short, long, default_value_t = 10_000)]
    count: u64,

    /// Topic to publish on
    #[clap(short, long, default_value = "bench/throughput")]
    topic: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    status: String,
    kind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Connecting to {}...", args.addr);
    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("Failed to connect to {}", args.addr))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut replies = BufReader::new(read_half).lines();

    // Microsecond keys stay unique and ascending within one run.
    let base_key = Utc::now().timestamp_micros() as u64;
    let started = std::time::Instant::now();
    let mut acked = 0u64;
    let mut failures: std::collections::HashMap<String, u64> = std::collections::HashMap::new();

    for i in 0..args.count {
        let line = json!({
            "op": "publish",
            "key": base_key + i,
            "topic": args.topic,
            "payload": format!("sample-{}", i),
        })
        .to_string();
        write_half.write_all(line.as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        let reply = replies.next_line().await?.context("Server closed the connection")?;
        let reply: Reply = serde_json::from_str(&reply)?;
        if reply.status == "ok" {
            acked += 1;
        } else {
            *failures.entry(reply.kind.unwrap_or_default()).or_insert(0) += 1;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    println!("\n----- Throughput Summary -----");
    println!("Published: {}", args.count);
    println!("Acknowledged: {}", acked);
    println!("Rate: {:.0} msg/s", acked as f64 / elapsed.max(f64::EPSILON));
    for (kind, n) in &failures {
        println!("Failed ({}): {}", kind, n);
    }
    println!("------------------------------\n");

    Ok(())
}
