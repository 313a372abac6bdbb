//! Scraping-API collector client
//!
//! Fetches an article through a scraping proxy and reduces the HTML to a title
//! and the concatenated paragraph text.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::capability::{CapabilityClient, CollectRequest, Failure, RawDocument};
use crate::config::CollectionConfig;
use crate::error::{Error, Result};

/// Body text is capped to keep extraction prompts bounded
pub const MAX_BODY_CHARS: usize = 10_000;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));

/// Collector backed by a ZenRows-style scraping API
#[derive(Clone)]
pub struct ScrapeClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ScrapeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ScrapeClient {
    pub fn new(config: &CollectionConfig, api_key: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CapabilityClient for ScrapeClient {
    type Request = CollectRequest;
    type Response = RawDocument;

    fn name(&self) -> &str {
        "scrape"
    }

    async fn invoke(&self, request: &CollectRequest) -> std::result::Result<RawDocument, Failure> {
        debug!(topic = %request.topic, "Fetching article through scraping API");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("url", request.topic.as_str()),
                ("apikey", self.api_key.as_str()),
                ("js_render", "true"),
                ("premium_proxy", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::from_status(status.as_u16(), &body));
        }

        let html = response.text().await?;
        parse_article(&html).ok_or_else(|| {
            Failure::InvalidResponse(format!("no title or paragraphs in page for {}", request.topic))
        })
    }
}

/// Reduce an HTML page to title and paragraph text
///
/// Returns `None` when the page has neither a title nor any paragraph text.
pub fn parse_article(html: &str) -> Option<RawDocument> {
    let document = Html::parse_document(html);

    let title = document
        .select(&H1)
        .next()
        .or_else(|| document.select(&TITLE).next())
        .map(element_text)
        .unwrap_or_default();

    let paragraphs: Vec<String> = document
        .select(&PARAGRAPH)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect();
    let body_text: String = paragraphs.join(" ").chars().take(MAX_BODY_CHARS).collect();

    if title.is_empty() && body_text.is_empty() {
        return None;
    }

    Some(RawDocument {
        title: if title.is_empty() {
            "Title Not Found".to_string()
        } else {
            title
        },
        body_text,
    })
}

/// Decoded text of an element with whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_article_prefers_h1() {
        let html = r#"<html><head><title>Site | News</title></head>
            <body><h1 class="story-title">APT31 targets <b>Russian</b> IT</h1>
            <p>First paragraph.</p><p class="x">Second &amp; final.</p></body></html>"#;

        let doc = parse_article(html).unwrap();
        assert_eq!(doc.title, "APT31 targets Russian IT");
        assert_eq!(doc.body_text, "First paragraph. Second & final.");
    }

    #[test]
    fn test_parse_article_decodes_entities() {
        let html = "<h1>China&#8217;s APT31 &rsquo;returns&rsquo;</h1>\
            <p>Loader&nbsp;&amp; backdoor &hellip; again</p>";

        let doc = parse_article(html).unwrap();
        assert_eq!(doc.title, "China\u{2019}s APT31 \u{2019}returns\u{2019}");
        assert_eq!(doc.body_text, "Loader & backdoor \u{2026} again");
    }

    #[test]
    fn test_parse_article_falls_back_to_title_tag() {
        let doc = parse_article("<title>Charon ransomware</title><p>Body</p>").unwrap();
        assert_eq!(doc.title, "Charon ransomware");
    }

    #[test]
    fn test_parse_article_ignores_pre_blocks() {
        let doc = parse_article("<h1>T</h1><pre>code</pre><p>text</p>").unwrap();
        assert_eq!(doc.body_text, "text");
    }

    #[test]
    fn test_parse_article_missing_title() {
        let doc = parse_article("<p>Only body</p>").unwrap();
        assert_eq!(doc.title, "Title Not Found");
    }

    #[test]
    fn test_parse_article_empty_page() {
        assert!(parse_article("<html><body><div>nothing</div></body></html>").is_none());
    }

    #[test]
    fn test_body_is_capped() {
        let html = format!("<h1>T</h1><p>{}</p>", "a".repeat(MAX_BODY_CHARS + 50));
        let doc = parse_article(&html).unwrap();
        assert_eq!(doc.body_text.chars().count(), MAX_BODY_CHARS);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let mut config = CollectionConfig::default();
        config.base_url = "http://127.0.0.1:9/v1/".to_string();
        config.timeout_secs = 2;
        let client = ScrapeClient::new(&config, "key").unwrap();

        let result = client
            .invoke(&CollectRequest {
                topic: "https://example.com".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Failure::Unreachable(_))));
    }
}
