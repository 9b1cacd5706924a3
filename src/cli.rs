//! Command-line interface definitions for Feed Relay.
//!
//! Every option can also come from the environment, which is how the bot is
//! usually driven from cron or a systemd timer.

use crate::config::{Policy, SendMode, SourceKind, StateBackend};
use clap::Parser;
use clap::builder::BoolishValueParser;
use std::path::PathBuf;

/// Poll one source, skip what was already delivered, post the rest to Telegram.
///
/// # Examples
///
/// ```sh
/// # ThingSpeak channel, one message per entry, watermark file
/// BOT_TOKEN=... CHANNEL_CHAT_ID=@mychannel feed_relay --thingspeak-channel-id 123456
///
/// # RSS feed as a chunked list, seen-set database
/// feed_relay --source rss --feed-url https://blog.example.com/feed.xml --send-mode list
///
/// # Blog listing page scraped with CSS selectors
/// feed_relay --source html --page-url https://example.com/blog --item-selector "article.post"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Which kind of source to poll
    #[arg(long, env = "SOURCE", value_enum, default_value_t = SourceKind::Thingspeak)]
    pub source: SourceKind,

    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Target chat or channel id (e.g. @channel or -100123...)
    #[arg(long, env = "CHANNEL_CHAT_ID")]
    pub chat_id: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_BASE", default_value = "https://api.telegram.org")]
    pub telegram_api_base: String,

    /// One message per item, or one chunked list
    #[arg(long, env = "SEND_MODE", value_enum, default_value_t = SendMode::Single)]
    pub send_mode: SendMode,

    /// Whether stored state gates delivery
    #[arg(long, env = "POLICY", value_enum, default_value_t = Policy::Incremental)]
    pub policy: Policy,

    /// State backend (watermark is ThingSpeak-only and its default; seen-set otherwise)
    #[arg(long, env = "STATE_BACKEND", value_enum)]
    pub state_backend: Option<StateBackend>,

    /// Path of the state file or database
    #[arg(long, env = "STATE_FILE")]
    pub state_path: Option<PathBuf>,

    /// Maximum number of records to request or keep per run
    #[arg(long, env = "RESULTS", default_value_t = 100)]
    pub limit: u32,

    /// Let Telegram render link previews
    #[arg(long, env = "LINK_PREVIEW", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub link_preview: bool,

    /// Maximum characters per list message
    #[arg(long, env = "CHUNK_BUDGET", default_value_t = crate::plan::DEFAULT_CHUNK_BUDGET)]
    pub chunk_budget: usize,

    /// Ceiling for every outbound HTTP call, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 20)]
    pub http_timeout_secs: u64,

    /// Header label for list messages (defaults to a source-derived name)
    #[arg(long, env = "LABEL")]
    pub label: Option<String>,

    /// ThingSpeak channel id
    #[arg(long, env = "THINGSPEAK_CHANNEL_ID")]
    pub thingspeak_channel_id: Option<String>,

    /// ThingSpeak read API key (private channels)
    #[arg(long, env = "THINGSPEAK_READ_KEY", hide_env_values = true)]
    pub thingspeak_read_key: Option<String>,

    /// ThingSpeak user API key, needed to clear the channel
    #[arg(long, env = "THINGSPEAK_USER_API_KEY", hide_env_values = true)]
    pub thingspeak_user_api_key: Option<String>,

    /// ThingSpeak API base URL
    #[arg(long, env = "THINGSPEAK_BASE_URL", default_value = "https://api.thingspeak.com")]
    pub thingspeak_base_url: String,

    /// Clear the ThingSpeak channel after every new entry was delivered
    #[arg(long, env = "CLEAR_AFTER_SEND", default_value_t = false, action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub clear_after_send: bool,

    /// RSS or Atom feed URL
    #[arg(long, env = "FEED_URL")]
    pub feed_url: Option<String>,

    /// Blog listing page URL
    #[arg(long, env = "PAGE_URL")]
    pub page_url: Option<String>,

    /// CSS selector matching one post on the listing page
    #[arg(long, env = "ITEM_SELECTOR", default_value = "article")]
    pub item_selector: String,

    /// CSS selector for the post title, relative to the item
    #[arg(long, env = "TITLE_SELECTOR", default_value = "h1, h2, h3")]
    pub title_selector: String,

    /// CSS selector for the post link, relative to the item
    #[arg(long, env = "LINK_SELECTOR", default_value = "a[href]")]
    pub link_selector: String,

    /// Forget seen-set entries older than this many days
    #[arg(long, env = "SEEN_RETENTION_DAYS")]
    pub seen_retention_days: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["feed_relay"]);
        assert_eq!(cli.source, SourceKind::Thingspeak);
        assert_eq!(cli.send_mode, SendMode::Single);
        assert_eq!(cli.policy, Policy::Incremental);
        assert_eq!(cli.chunk_budget, 3900);
        assert!(!cli.link_preview);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "feed_relay",
            "--source",
            "rss",
            "--feed-url",
            "https://example.com/feed.xml",
            "--send-mode",
            "list",
            "--policy",
            "full-batch",
            "--state-backend",
            "seen-set",
            "--clear-after-send",
            "1",
        ]);

        assert_eq!(cli.source, SourceKind::Rss);
        assert_eq!(cli.send_mode, SendMode::List);
        assert_eq!(cli.policy, Policy::FullBatch);
        assert_eq!(cli.state_backend, Some(StateBackend::SeenSet));
        assert!(cli.clear_after_send);
    }
}
