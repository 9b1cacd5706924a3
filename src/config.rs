//! Validated, immutable run configuration.
//!
//! [`Config::from_cli`] is the only constructor. It performs every pre-flight
//! check so that a configuration problem stops the run before anything is
//! fetched, sent or written.

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::format::list_header;
use crate::models::GroupingMode;
use clap::ValueEnum;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Telegram rejects messages above 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    Thingspeak,
    Rss,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendMode {
    Single,
    List,
}

impl SendMode {
    pub fn grouping(self) -> GroupingMode {
        match self {
            SendMode::Single => GroupingMode::Single,
            SendMode::List => GroupingMode::ChunkedList,
        }
    }
}

/// Whether persisted state gates delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Only items newer than the stored state are delivered.
    Incremental,
    /// Every fetched item is delivered; state is kept for diagnostics.
    FullBatch,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Incremental => "incremental",
            Policy::FullBatch => "full-batch",
        })
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(Policy::Incremental),
            "full-batch" => Ok(Policy::FullBatch),
            other => Err(format!("unknown policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateBackend {
    Watermark,
    SeenSet,
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    ThingSpeak {
        base_url: Url,
        channel_id: String,
        read_key: Option<String>,
        results: u32,
        /// User API key, present only when the channel is cleared after send.
        clear_with_key: Option<String>,
    },
    Rss {
        feed_url: Url,
        limit: usize,
    },
    Html {
        page_url: Url,
        item_selector: String,
        title_selector: String,
        link_selector: String,
        limit: usize,
    },
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: Url,
    pub bot_token: String,
    pub chat_id: String,
    pub link_preview: bool,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub grouping: GroupingMode,
    pub policy: Policy,
    pub chunk_budget: usize,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub backend: StateBackend,
    pub path: PathBuf,
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub telegram: TelegramConfig,
    pub delivery: DeliveryConfig,
    pub state: StateConfig,
    pub http_timeout: Duration,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_url(raw: &str, name: &'static str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn check_selector(raw: &str, name: &'static str) -> Result<String, ConfigError> {
    Selector::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    Ok(raw.to_string())
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let bot_token = required(cli.bot_token, "BOT_TOKEN")?;
        let chat_id = required(cli.chat_id, "CHANNEL_CHAT_ID")?;

        if cli.chunk_budget == 0 || cli.chunk_budget > MAX_MESSAGE_CHARS {
            return Err(ConfigError::Invalid {
                name: "CHUNK_BUDGET",
                reason: format!("must be between 1 and {MAX_MESSAGE_CHARS}"),
            });
        }
        if cli.limit == 0 {
            return Err(ConfigError::Invalid {
                name: "RESULTS",
                reason: "must be at least 1".into(),
            });
        }
        if cli.clear_after_send && cli.source != SourceKind::Thingspeak {
            return Err(ConfigError::Invalid {
                name: "CLEAR_AFTER_SEND",
                reason: "only supported for the thingspeak source".into(),
            });
        }

        let limit = cli.limit as usize;
        let (source, default_label) = match cli.source {
            SourceKind::Thingspeak => {
                let channel_id = required(cli.thingspeak_channel_id, "THINGSPEAK_CHANNEL_ID")?;
                let clear_with_key = if cli.clear_after_send {
                    Some(required(cli.thingspeak_user_api_key, "THINGSPEAK_USER_API_KEY")?)
                } else {
                    None
                };
                let label = format!("ThingSpeak {channel_id}");
                (
                    SourceConfig::ThingSpeak {
                        base_url: parse_url(&cli.thingspeak_base_url, "THINGSPEAK_BASE_URL")?,
                        channel_id,
                        read_key: cli.thingspeak_read_key.filter(|k| !k.trim().is_empty()),
                        results: cli.limit,
                        clear_with_key,
                    },
                    label,
                )
            }
            SourceKind::Rss => {
                let feed_url = parse_url(&required(cli.feed_url, "FEED_URL")?, "FEED_URL")?;
                let label = feed_url.host_str().unwrap_or("feed").to_string();
                (SourceConfig::Rss { feed_url, limit }, label)
            }
            SourceKind::Html => {
                let page_url = parse_url(&required(cli.page_url, "PAGE_URL")?, "PAGE_URL")?;
                let label = page_url.host_str().unwrap_or("blog").to_string();
                (
                    SourceConfig::Html {
                        page_url,
                        item_selector: check_selector(&cli.item_selector, "ITEM_SELECTOR")?,
                        title_selector: check_selector(&cli.title_selector, "TITLE_SELECTOR")?,
                        link_selector: check_selector(&cli.link_selector, "LINK_SELECTOR")?,
                        limit,
                    },
                    label,
                )
            }
        };

        let backend = cli.state_backend.unwrap_or(match cli.source {
            SourceKind::Thingspeak => StateBackend::Watermark,
            SourceKind::Rss | SourceKind::Html => StateBackend::SeenSet,
        });
        // A watermark needs every item to sort by (timestamp, identity). Feeds
        // and listings may carry undated entries in newest-first order.
        if backend == StateBackend::Watermark && cli.source != SourceKind::Thingspeak {
            return Err(ConfigError::Invalid {
                name: "STATE_BACKEND",
                reason: "only thingspeak entries are totally ordered; use seen-set".into(),
            });
        }
        let path = cli.state_path.unwrap_or_else(|| {
            let stem = match cli.source {
                SourceKind::Thingspeak => "thingspeak",
                SourceKind::Rss => "rss",
                SourceKind::Html => "html",
            };
            let ext = match backend {
                StateBackend::Watermark => "json",
                StateBackend::SeenSet => "sqlite",
            };
            PathBuf::from("state").join(format!("{stem}.{ext}"))
        });

        let label = cli
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(default_label);
        let widest_header = list_header(&label, cli.limit as usize).chars().count();
        if widest_header > cli.chunk_budget {
            return Err(ConfigError::Invalid {
                name: "LABEL",
                reason: format!(
                    "list header needs {widest_header} characters but CHUNK_BUDGET is {}",
                    cli.chunk_budget
                ),
            });
        }

        Ok(Config {
            source,
            telegram: TelegramConfig {
                api_base: parse_url(&cli.telegram_api_base, "TELEGRAM_API_BASE")?,
                bot_token,
                chat_id,
                link_preview: cli.link_preview,
            },
            delivery: DeliveryConfig {
                grouping: cli.send_mode.grouping(),
                policy: cli.policy,
                chunk_budget: cli.chunk_budget,
                label,
            },
            state: StateConfig {
                backend,
                path,
                retention_days: cli.seen_retention_days,
            },
            http_timeout: Duration::from_secs(cli.http_timeout_secs.max(1)),
        })
    }
}
