//! ThingSpeak channel feed.
//!
//! Entries are read from `GET /channels/{id}/feeds.json?results=N`. The bot
//! uses the channel as a post queue: `field1` carries the title, `field2`
//! the link and `field3` an optional body. `entry_id` is monotonic and becomes
//! the item's sequence identity.

use super::get_text;
use crate::error::FetchError;
use crate::models::RawRecord;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct FeedsResponse {
    #[serde(default)]
    feeds: Vec<Feed>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    entry_id: Option<u64>,
    created_at: Option<String>,
    field1: Option<String>,
    field2: Option<String>,
    field3: Option<String>,
}

/// Map a `feeds.json` body onto raw records.
pub fn parse_feeds(body: &str) -> Result<Vec<RawRecord>, FetchError> {
    let response: FeedsResponse = serde_json::from_str(body)?;
    Ok(response
        .feeds
        .into_iter()
        .map(|f| RawRecord {
            id: f.entry_id.map(|id| id.to_string()),
            sequence: f.entry_id,
            occurred_at: f.created_at,
            title: f.field1,
            link: f.field2,
            body: f.field3,
        })
        .collect())
}

#[derive(Debug)]
pub struct ThingSpeakSource {
    pub(super) client: Client,
    pub(super) base_url: Url,
    pub(super) channel_id: String,
    pub(super) read_key: Option<String>,
    pub(super) results: u32,
    pub(super) clear_with_key: Option<String>,
}

impl ThingSpeakSource {
    fn feeds_url(&self) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["channels", self.channel_id.as_str(), "feeds.json"]);
        Ok(url)
    }

    pub async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let mut url = self.feeds_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("results", &self.results.to_string());
            if let Some(key) = &self.read_key {
                query.append_pair("api_key", key);
            }
        }
        let body = get_text(&self.client, url).await?;
        parse_feeds(&body)
    }

    /// Delete every entry in the channel, when configured to.
    #[instrument(level = "info", skip_all, fields(channel_id = %self.channel_id))]
    pub async fn clear_if_configured(&self) -> Result<(), FetchError> {
        let Some(key) = &self.clear_with_key else {
            return Ok(());
        };
        let mut url = self.feeds_url()?;
        url.query_pairs_mut().append_pair("api_key", key);
        let rsp = self.client.delete(url).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: rsp.text().await.unwrap_or_default(),
            });
        }
        info!("Channel cleared");
        Ok(())
    }
}
