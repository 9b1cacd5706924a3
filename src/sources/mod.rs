//! Data sources that produce raw records for one run.
//!
//! | Source | Module | Method | Identity | Order |
//! |--------|--------|--------|----------|-------|
//! | ThingSpeak channel | [`thingspeak`] | JSON API | `entry_id` | by id |
//! | RSS / Atom feed | [`rss`] | XML parsing | guid / id / link | by time when complete |
//! | Blog listing page | [`html`] | CSS selectors | absolute link | page order |
//!
//! Each module exposes a pure `parse_*` function over the response body and
//! a thin async `fetch` around it. A fetch either returns the whole batch or
//! fails the run; individual malformed records are left for the normalizer
//! to drop.

pub mod html;
pub mod rss;
pub mod thingspeak;

use crate::config::{Config, SourceConfig};
use crate::error::FetchError;
use crate::models::RawRecord;
use crate::normalize::{DedupKey, NormalizeRules, SortOrder};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

/// GET `url` and return the body, treating non-2xx as a fetch error.
#[instrument(level = "debug", skip_all, fields(host = url.host_str().unwrap_or_default(), path = url.path()))]
pub(crate) async fn get_text(client: &Client, url: Url) -> Result<String, FetchError> {
    let rsp = client.get(url).send().await?;
    let status = rsp.status();
    let body = rsp.text().await?;
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }
    debug!(bytes = body.len(), "Fetched source body");
    Ok(body)
}

/// The configured source for this run.
#[derive(Debug)]
pub enum Source {
    ThingSpeak(thingspeak::ThingSpeakSource),
    Rss(rss::RssSource),
    Html(html::HtmlSource),
}

impl Source {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(match &config.source {
            SourceConfig::ThingSpeak {
                base_url,
                channel_id,
                read_key,
                results,
                clear_with_key,
            } => Source::ThingSpeak(thingspeak::ThingSpeakSource {
                client,
                base_url: base_url.clone(),
                channel_id: channel_id.clone(),
                read_key: read_key.clone(),
                results: *results,
                clear_with_key: clear_with_key.clone(),
            }),
            SourceConfig::Rss { feed_url, limit } => Source::Rss(rss::RssSource {
                client,
                feed_url: feed_url.clone(),
                limit: *limit,
            }),
            SourceConfig::Html {
                page_url,
                item_selector,
                title_selector,
                link_selector,
                limit,
            } => Source::Html(html::HtmlSource::new(
                client,
                page_url.clone(),
                html::ListingSelectors::parse(item_selector, title_selector, link_selector)?,
                *limit,
            )),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Source::ThingSpeak(_) => "thingspeak",
            Source::Rss(_) => "rss",
            Source::Html(_) => "html",
        }
    }

    /// How records from this source are ordered and deduplicated.
    pub fn rules(&self) -> NormalizeRules {
        match self {
            Source::ThingSpeak(_) => NormalizeRules {
                order: SortOrder::Identity,
                dedup: DedupKey::Link,
            },
            Source::Rss(_) => NormalizeRules {
                order: SortOrder::Timestamp,
                dedup: DedupKey::Identity,
            },
            Source::Html(_) => NormalizeRules {
                order: SortOrder::Source,
                dedup: DedupKey::Link,
            },
        }
    }

    #[instrument(level = "info", skip_all, fields(source = self.name()))]
    pub async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let records = match self {
            Source::ThingSpeak(s) => s.fetch().await?,
            Source::Rss(s) => s.fetch().await?,
            Source::Html(s) => s.fetch().await?,
        };
        info!(count = records.len(), "Fetched raw records");
        Ok(records)
    }

    /// Source-side cleanup after every planned unit was delivered.
    pub async fn after_delivery(&self) -> Result<(), FetchError> {
        match self {
            Source::ThingSpeak(s) => s.clear_if_configured().await,
            Source::Rss(_) | Source::Html(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_error_hides_query_keys() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/channels/1/feeds.json?api_key=READSECRET")).unwrap();
        let err = get_text(&Client::new(), url).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
        assert!(!err.to_string().contains("READSECRET"), "{err}");
        assert!(!crate::error::RunError::from(err).to_string().contains("READSECRET"));
    }
}
