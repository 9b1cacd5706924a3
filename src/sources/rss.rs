//! RSS 2.0 and Atom feeds.
//!
//! Parses `<item>` and `<entry>` elements with a streaming quick-xml reader.
//! Namespace prefixes are ignored, so `dc:date` counts as a timestamp and
//! `atom:link` inside an item counts as a link.

use super::get_text;
use crate::error::FetchError;
use crate::models::RawRecord;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct RssSource {
    pub(super) client: Client,
    pub(super) feed_url: Url,
    pub(super) limit: usize,
}

impl RssSource {
    pub async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = get_text(&self.client, self.feed_url.clone()).await?;
        parse_feed(&body, self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Id,
    Published,
    Updated,
    Body,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"title" => Field::Title,
            b"link" => Field::Link,
            b"guid" | b"id" => Field::Id,
            b"pubDate" | b"published" | b"date" => Field::Published,
            b"updated" => Field::Updated,
            b"description" | b"summary" | b"content" | b"encoded" => Field::Body,
            _ => return None,
        })
    }
}

/// Fields collected for the entry currently being read.
#[derive(Debug, Default)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    id: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    body: Option<String>,
}

impl Entry {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Id => &mut self.id,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Body => &mut self.body,
        };
        if slot.is_none() && !value.trim().is_empty() {
            *slot = Some(value);
        }
    }

    /// Atom `<link href>`; only the alternate link names the post.
    fn set_atom_link(&mut self, e: &BytesStart<'_>) {
        let attr = |name: &str| {
            e.try_get_attribute(name)
                .ok()
                .flatten()
                .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
        };
        let rel = attr("rel");
        if matches!(rel.as_deref(), None | Some("alternate")) {
            if let Some(href) = attr("href") {
                self.set(Field::Link, href);
            }
        }
    }

    fn into_record(self) -> RawRecord {
        let link = self.link;
        RawRecord {
            id: self.id.or_else(|| link.clone()),
            sequence: None,
            occurred_at: self.published.or(self.updated),
            title: self.title,
            link,
            body: self.body.map(|b| strip_html(&b)),
        }
    }
}

/// Remove tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an RSS or Atom document into at most `limit` raw records.
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<RawRecord>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut field: Option<(Field, Vec<u8>)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"item" || name == b"entry" {
                    entry = Some(Entry::default());
                    field = None;
                } else if let Some(current) = entry.as_mut() {
                    if field.is_none() {
                        if name == b"link" {
                            current.set_atom_link(&e);
                        }
                        if let Some(f) = Field::from_local_name(name) {
                            field = Some((f, name.to_vec()));
                            text.clear();
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(current) = entry.as_mut() {
                    if field.is_none() && e.local_name().as_ref() == b"link" {
                        current.set_atom_link(&e);
                    }
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    let value = t
                        .unescape()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    text.push_str(&value);
                }
            }
            Event::CData(c) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if let Some((f, open)) = &field {
                    if open.as_slice() == name {
                        if let Some(current) = entry.as_mut() {
                            current.set(*f, std::mem::take(&mut text));
                        }
                        field = None;
                    }
                } else if name == b"item" || name == b"entry" {
                    if let Some(done) = entry.take() {
                        records.push(done.into_record());
                        if records.len() >= limit {
                            break;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(count = records.len(), "Parsed feed entries");
    Ok(records)
}
