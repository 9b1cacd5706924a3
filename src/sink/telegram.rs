//! Telegram Bot API sink.
//!
//! Sends through `POST {api_base}/bot{token}/sendMessage` with
//! `parse_mode=HTML`. The token never appears in logs.

use super::MessageSink;
use crate::config::TelegramConfig;
use crate::error::SinkError;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramSink {
    client: Client,
    endpoint: Url,
    chat_id: String,
    link_preview: bool,
}

impl fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSink")
            .field("chat_id", &self.chat_id)
            .field("link_preview", &self.link_preview)
            .finish()
    }
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut endpoint = config.api_base.clone();
        endpoint
            .path_segments_mut()
            .map_err(|()| SinkError::Endpoint(config.api_base.to_string()))?
            .pop_if_empty()
            .push(&format!("bot{}", config.bot_token))
            .push("sendMessage");
        Ok(Self {
            client,
            endpoint,
            chat_id: config.chat_id.clone(),
            link_preview: config.link_preview,
        })
    }
}

impl MessageSink for TelegramSink {
    #[instrument(level = "debug", skip_all, fields(chat_id = %self.chat_id, chars = text.chars().count()))]
    async fn send(&self, text: &str) -> Result<(), SinkError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: !self.link_preview,
        };
        let rsp = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;
        let status = rsp.status();
        let body = rsp.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 300), "Telegram rejected message");
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(api) if !api.ok => Err(SinkError::Rejected {
                status: status.as_u16(),
                body: api.description.unwrap_or(body),
            }),
            _ => {
                debug!("Message delivered");
                Ok(())
            }
        }
    }
}
