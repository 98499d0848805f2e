//! Probe: activity feed
//!
//! Connects to the Astro WebSocket, subscribes to `channel.activities` with the
//! token from `JWT_TOKEN` / `config.toml`, and prints every frame received for
//! the listening window along with how the ledger would decode it. Nothing is
//! written to the ledger files.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use activity_ledger::classifier::classify;
use activity_ledger::config::{AppConfig, CONFIG_PATH};
use activity_ledger::connection::{ActivitySocket, Connector, SocketFrame, WsConnector};
use activity_ledger::ledger::delta_label;
use activity_ledger::protocol::{self, Inbound, Request};
use activity_ledger::rates::RateTable;
use activity_ledger::ACTIVITIES_TOPIC;

#[derive(Parser)]
#[command(name = "probe_activities", about = "Dump raw activity feed frames")]
struct Args {
    /// Seconds to listen before unsubscribing
    #[arg(long, default_value_t = 30)]
    seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load_or_default(Path::new(CONFIG_PATH))?;
    config.apply_env(|key| std::env::var(key).ok());
    let token = config.token()?.to_string();
    let rates = RateTable::new(&config.points, &config.earnings);

    println!("=== Probe: activity feed ===");
    println!("URL: {}", config.connection.url);
    println!();

    let mut connector = WsConnector::new(&config.connection.url)?;
    let mut socket = connector.connect().await?;
    println!("Connected!");

    let subscribe = Request::subscribe(ACTIVITIES_TOPIC, &token);
    println!("--- Sending subscription (nonce {}) ---", subscribe.nonce);
    socket.send_text(subscribe.to_text()?).await?;
    println!();

    println!("--- Listening for {} seconds ---", args.seconds);
    let start = Instant::now();
    let timeout = Duration::from_secs(args.seconds);
    let mut msg_count = 0u64;
    let mut kinds: HashMap<String, u64> = HashMap::new();

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        let frame = match tokio::time::timeout(remaining, socket.next_frame()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                println!("WebSocket error: {e:#}");
                break;
            }
            Ok(None) => {
                println!("WebSocket stream ended");
                break;
            }
            Err(_) => break,
        };

        let elapsed = start.elapsed().as_secs_f64();
        match frame {
            SocketFrame::Text(text) => {
                msg_count += 1;
                println!("[{elapsed:.1}s] #{msg_count}: {text}");
                match protocol::decode(&text) {
                    Ok(Inbound::Activity(event)) => {
                        let delta = classify(&event, &rates);
                        *kinds.entry(event.kind.label().to_string()).or_default() += 1;
                        println!(
                            "  -> {} by {:?}: points {}, earnings {}",
                            event.kind,
                            event.username,
                            delta_label(delta.points),
                            delta_label(delta.earnings)
                        );
                    }
                    Ok(Inbound::Response { error: Some(err), .. }) => {
                        println!("  -> response error: {err}");
                    }
                    Ok(other) => println!("  -> {other:?}"),
                    Err(e) => println!("  -> malformed: {e:#}"),
                }
            }
            SocketFrame::Close { code, reason } => {
                println!("[{elapsed:.1}s] Close: {code:?} {reason}");
                break;
            }
            SocketFrame::Other => {}
        }
    }

    let unsubscribe = Request::unsubscribe(ACTIVITIES_TOPIC, &token);
    let _ = socket.send_text(unsubscribe.to_text()?).await;
    let _ = socket.close().await;

    println!();
    println!("--- Summary ---");
    println!("Total text frames: {msg_count}");
    println!("Activities by kind: {kinds:?}");
    println!("=== Probe complete ===");
    Ok(())
}
