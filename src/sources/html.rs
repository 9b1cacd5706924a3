//! Blog listing pages scraped with CSS selectors.
//!
//! Every element matching the item selector is one post. Within it the first
//! title match gives the title and the first link match gives the href,
//! resolved against the page URL. Posts keep page order.

use super::get_text;
use crate::error::FetchError;
use crate::models::RawRecord;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Compiled selectors for one listing layout.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    item: Selector,
    title: Selector,
    link: Selector,
    time: Selector,
}

fn compile(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|e| FetchError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl ListingSelectors {
    pub fn parse(item: &str, title: &str, link: &str) -> Result<Self, FetchError> {
        Ok(Self {
            item: compile(item)?,
            title: compile(title)?,
            link: compile(link)?,
            time: compile("time[datetime]")?,
        })
    }
}

#[derive(Debug)]
pub struct HtmlSource {
    client: Client,
    page_url: Url,
    selectors: ListingSelectors,
    limit: usize,
}

impl HtmlSource {
    pub fn new(client: Client, page_url: Url, selectors: ListingSelectors, limit: usize) -> Self {
        Self {
            client,
            page_url,
            selectors,
            limit,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = get_text(&self.client, self.page_url.clone()).await?;
        Ok(parse_listing(&body, &self.page_url, &self.selectors, self.limit))
    }
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract at most `limit` posts from a listing page.
pub fn parse_listing(html: &str, page_url: &Url, selectors: &ListingSelectors, limit: usize) -> Vec<RawRecord> {
    let doc = Html::parse_document(html);
    let mut records = Vec::new();

    for el in doc.select(&selectors.item).take(limit) {
        let anchor = if el.value().attr("href").is_some() {
            Some(el)
        } else {
            el.select(&selectors.link).next()
        };
        let link = anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| page_url.join(href.trim()).ok())
            .map(String::from);

        let title = el
            .select(&selectors.title)
            .next()
            .map(collapsed_text)
            .filter(|t| !t.is_empty())
            .or_else(|| anchor.map(collapsed_text).filter(|t| !t.is_empty()));

        let occurred_at = el
            .select(&selectors.time)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .map(str::to_string);

        records.push(RawRecord {
            id: link.clone(),
            sequence: None,
            occurred_at,
            title,
            link,
            body: None,
        });
    }

    debug!(count = records.len(), page = %page_url, "Parsed listing page");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <main>
          <article>
            <h2>  Rust   tips </h2>
            <time datetime="2024-05-02T08:00:00Z">May 2</time>
            <a href="/posts/rust-tips">Read more</a>
          </article>
          <article>
            <a href="https://other.example.org/guest">Guest post</a>
          </article>
          <article>
            <h2>No link here</h2>
          </article>
        </main>
    </body></html>"#;

    fn selectors() -> ListingSelectors {
        ListingSelectors::parse("article", "h1, h2, h3", "a[href]").unwrap()
    }

    fn base() -> Url {
        Url::parse("https://blog.example.com/archive/").unwrap()
    }

    #[test]
    fn test_parse_listing_resolves_links_and_titles() {
        let records = parse_listing(PAGE, &base(), &selectors(), 10);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].title.as_deref(), Some("Rust tips"));
        assert_eq!(records[0].link.as_deref(), Some("https://blog.example.com/posts/rust-tips"));
        assert_eq!(records[0].id, records[0].link);
        assert_eq!(records[0].occurred_at.as_deref(), Some("2024-05-02T08:00:00Z"));

        assert_eq!(records[1].title.as_deref(), Some("Guest post"));
        assert_eq!(records[1].link.as_deref(), Some("https://other.example.org/guest"));

        assert_eq!(records[2].link, None);
    }

    #[test]
    fn test_item_selector_may_be_the_anchor() {
        let html = r#"<ul><li><a class="post" href="a.html">A</a></li><li><a class="post" href="b.html">B</a></li></ul>"#;
        let sel = ListingSelectors::parse("a.post", "h2", "a[href]").unwrap();
        let records = parse_listing(html, &base(), &sel, 10);
        let links: Vec<_> = records.iter().filter_map(|r| r.link.as_deref()).collect();
        assert_eq!(
            links,
            vec!["https://blog.example.com/archive/a.html", "https://blog.example.com/archive/b.html"]
        );
        assert_eq!(records[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn test_limit_and_bad_selector() {
        assert_eq!(parse_listing(PAGE, &base(), &selectors(), 1).len(), 1);
        let err = ListingSelectors::parse("article[", "h2", "a").unwrap_err();
        assert!(matches!(err, FetchError::Selector { .. }));
    }

    #[tokio::test]
    async fn test_fetch_parses_served_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let page_url = Url::parse(&format!("{}/blog", server.uri())).unwrap();
        let source = HtmlSource::new(Client::new(), page_url, selectors(), 10);
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].link.as_deref().unwrap().ends_with("/posts/rust-tips"));
    }
}
