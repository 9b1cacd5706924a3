//! # Feed Relay
//!
//! A one-shot bot that polls a single content source, works out which entries
//! have not been delivered yet, and posts them to a Telegram channel. Meant to
//! be run from cron or a systemd timer.
//!
//! ## Sources
//!
//! - ThingSpeak channel feeds (`field1` title, `field2` link, `field3` body)
//! - RSS 2.0 and Atom feeds
//! - Blog listing pages scraped with CSS selectors
//!
//! ## Usage
//!
//! ```sh
//! BOT_TOKEN=... CHANNEL_CHAT_ID=@channel feed_relay --thingspeak-channel-id 123456
//! feed_relay --source rss --feed-url https://blog.example.com/feed.xml --send-mode list
//! ```
//!
//! ## Architecture
//!
//! Each run is a straight pipeline:
//! 1. **Load**: read the watermark file or seen-set database
//! 2. **Fetch**: download the source's current batch
//! 3. **Normalize**: validate, order and deduplicate records
//! 4. **Plan**: select unseen items and render one message each or chunked lists
//! 5. **Deliver**: send in order, committing state as each send succeeds

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod deliver;
mod error;
mod format;
mod models;
mod normalize;
mod plan;
mod run;
mod sink;
mod sources;
mod store;
mod utils;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_relay starting up");

    let args = Cli::parse();
    debug!(source = ?args.source, send_mode = ?args.send_mode, policy = ?args.policy, "Parsed CLI arguments");

    let config = match Config::from_cli(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration; nothing fetched or sent");
            return Err(e.into());
        }
    };
    info!(
        chat_id = %config.telegram.chat_id,
        state = %config.state.path.display(),
        backend = ?config.state.backend,
        grouping = ?config.delivery.grouping,
        policy = %config.delivery.policy,
        "Configuration loaded"
    );

    let result = run::run(&config).await;

    let elapsed = start_time.elapsed();
    match result {
        Ok(summary) => {
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                delivered = summary.delivered_items,
                "Execution complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(?elapsed, error = %e, "Run failed");
            Err(e.into())
        }
    }
}
