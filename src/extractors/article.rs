use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{dedupe_preserving_order, ContentExtractor, ExtractedContent};
use crate::fetch;
use crate::router::PlatformTag;
use crate::{ExtractError, Result};

/// Article extractor and the default for anything that routes nowhere
/// else. Pulls Open-Graph/Twitter-card/meta fields with a fixed per-field
/// precedence, then runs a readability-style main-content pass.
pub struct ArticleExtractor {
    client: reqwest::Client,
}

/// Minimum character count for a container to count as main content;
/// under this we treat the page as paywalled or dynamically rendered.
const MIN_CONTENT_CHARS: usize = 200;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    ".post-content",
    ".entry-content",
    ".article-content",
    ".article-body",
    "#content",
];

const BYLINE_SELECTORS: &[&str] = &[
    ".author",
    ".byline",
    r#"[rel="author"]"#,
    ".post-author",
    ".article-author",
    r#"[itemprop="author"]"#,
];

impl ArticleExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentExtractor for ArticleExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Article
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        if !self.can_handle(url) {
            return Err(ExtractError::InvalidUrl(url.to_string()).into());
        }

        let html = fetch::fetch_text(&self.client, url).await?;

        // DOM work happens in a sync helper so no non-Send parser state is
        // held across an await point.
        let page = parse_article(&html, url)?;

        let mut content = ExtractedContent::new(
            PlatformTag::Article,
            url,
            page.title,
            page.author,
        );
        content.author_url = page.origin;
        content.date = page.date;
        content.transcript = Some(page.content_text);
        content.description = page.description;
        content.links = page.links;
        content.thumbnail_url = page.image;
        if let Some(site_name) = page.site_name {
            content
                .raw
                .insert("site_name".to_string(), serde_json::Value::String(site_name));
        }

        Ok(content)
    }
}

#[derive(Debug)]
struct ParsedArticle {
    title: String,
    author: String,
    origin: Option<String>,
    date: Option<String>,
    description: Option<String>,
    image: Option<String>,
    site_name: Option<String>,
    content_text: String,
    links: Vec<String>,
}

fn selector(input: &str) -> Selector {
    Selector::parse(input).expect("static selector")
}

/// Read a meta tag by Open-Graph `property` first, then by `name`.
fn meta_content(document: &Html, name: &str) -> Option<String> {
    for attribute in ["property", "name"] {
        let css = format!(r#"meta[{}="{}"]"#, attribute, name);
        // The parse error borrows the selector string, so shed it here
        let sel = match Selector::parse(&css) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        if let Some(element) = document.select(&sel).next() {
            if let Some(value) = element.value().attr("content") {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn first_meta(document: &Html, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| meta_content(document, name))
}

fn byline_author(document: &Html) -> Option<String> {
    for css in BYLINE_SELECTORS {
        if let Ok(sel) = Selector::parse(css) {
            if let Some(element) = document.select(&sel).next() {
                let text = collapse(&element.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    let cleaned = text
                        .strip_prefix("by ")
                        .or_else(|| text.strip_prefix("By "))
                        .unwrap_or(&text)
                        .trim()
                        .to_string();
                    return Some(cleaned);
                }
            }
        }
    }
    None
}

fn collapse(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").to_string()
}

/// Main-content pass: the densest candidate container wins; paragraphs are
/// preferred over raw text so boilerplate and scripts do not leak in.
fn container_text(container: ElementRef<'_>) -> String {
    let paragraph = selector("p, li, blockquote, h2, h3");
    let parts: Vec<String> = container
        .select(&paragraph)
        .map(|el| collapse(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        collapse(&container.text().collect::<Vec<_>>().join(" "))
    } else {
        parts.join("\n\n")
    }
}

fn anchors(container: ElementRef<'_>) -> Vec<String> {
    let anchor = selector("a[href]");
    let hrefs = container
        .select(&anchor)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| href.starts_with("http://") || href.starts_with("https://"))
        .map(String::from)
        .collect();
    dedupe_preserving_order(hrefs)
}

/// ISO publish dates reduce to `YYYY-MM-DD`; anything unparseable passes
/// through as written.
fn format_meta_date(raw: &str) -> String {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return parsed.date_naive().format("%Y-%m-%d").to_string();
    }
    if raw.len() >= 10 {
        if let Ok(parsed) = chrono::NaiveDate::parse_from_str(&raw[..10], "%Y-%m-%d") {
            return parsed.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

fn parse_article(html: &str, url: &str) -> Result<ParsedArticle> {
    let document = Html::parse_document(html);
    let parsed_url = Url::parse(url).ok();

    let host = parsed_url
        .as_ref()
        .and_then(|u| u.host_str())
        .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string());

    let title = first_meta(&document, &["og:title", "twitter:title"])
        .or_else(|| {
            document
                .select(&selector("title"))
                .next()
                .map(|el| collapse(&el.text().collect::<Vec<_>>().join(" ")))
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let description = first_meta(
        &document,
        &["og:description", "twitter:description", "description"],
    );

    let site_name = first_meta(&document, &["og:site_name"]).or_else(|| host.clone());

    let author = first_meta(&document, &["author", "article:author"])
        .or_else(|| byline_author(&document))
        .or_else(|| site_name.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let date = first_meta(&document, &["article:published_time", "date", "pubdate"])
        .map(|raw| format_meta_date(&raw));

    let image = first_meta(&document, &["og:image", "twitter:image"]);

    // Pick the candidate container with the most text
    let mut best: Option<(ElementRef<'_>, String)> = None;
    for css in CONTENT_SELECTORS {
        if let Ok(sel) = Selector::parse(css) {
            for element in document.select(&sel) {
                let text = container_text(element);
                if best.as_ref().map(|(_, t)| text.len() > t.len()).unwrap_or(true) {
                    best = Some((element, text));
                }
            }
        }
    }

    let (content_text, links) = match best {
        Some((element, text)) if text.len() >= MIN_CONTENT_CHARS => {
            let links = anchors(element);
            (text, links)
        }
        _ => {
            // Paragraph-density fallback over the whole document
            let body = document
                .select(&selector("body"))
                .next()
                .map(container_text)
                .unwrap_or_default();
            if body.len() < MIN_CONTENT_CHARS {
                return Err(ExtractError::NoContentExtracted(format!(
                    "{}: the page may be paywalled or rendered dynamically",
                    url
                ))
                .into());
            }
            let links = document
                .select(&selector("body"))
                .next()
                .map(anchors)
                .unwrap_or_default();
            (body, links)
        }
    };

    Ok(ParsedArticle {
        title,
        author,
        origin: parsed_url.map(|u| u.origin().ascii_serialization()),
        date,
        description,
        image,
        site_name,
        content_text,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(head: &str, body: &str) -> String {
        format!("<html><head>{}</head><body>{}</body></html>", head, body)
    }

    fn long_paragraphs() -> String {
        let sentence = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        format!("<article><p>{}</p><p>{}</p></article>", sentence, sentence)
    }

    #[test]
    fn open_graph_title_wins_over_document_title() {
        let html = page(
            r#"<meta property="og:title" content="OG Title"><title>Doc Title</title>"#,
            &long_paragraphs(),
        );
        let parsed = parse_article(&html, "https://www.example.com/post").unwrap();
        assert_eq!(parsed.title, "OG Title");
        assert_eq!(parsed.site_name.as_deref(), Some("example.com"));
        assert_eq!(parsed.origin.as_deref(), Some("https://www.example.com"));
    }

    #[test]
    fn meta_name_attribute_read_when_property_absent() {
        let html = page(
            r#"<meta name="description" content="Plain meta description">"#,
            &long_paragraphs(),
        );
        let parsed = parse_article(&html, "https://example.com/post").unwrap();
        assert_eq!(parsed.description.as_deref(), Some("Plain meta description"));
    }

    #[test]
    fn document_title_used_when_meta_absent() {
        let html = page("<title>Doc Title</title>", &long_paragraphs());
        let parsed = parse_article(&html, "https://example.com/post").unwrap();
        assert_eq!(parsed.title, "Doc Title");
    }

    #[test]
    fn byline_fallback_strips_by_prefix() {
        let html = page(
            "",
            &format!(r#"<div class="byline">By Jane Doe</div>{}"#, long_paragraphs()),
        );
        let parsed = parse_article(&html, "https://example.com/post").unwrap();
        assert_eq!(parsed.author, "Jane Doe");
    }

    #[test]
    fn iso_publish_date_reduces_to_day() {
        let html = page(
            r#"<meta property="article:published_time" content="2024-03-05T10:30:00+00:00">"#,
            &long_paragraphs(),
        );
        let parsed = parse_article(&html, "https://example.com/post").unwrap();
        assert_eq!(parsed.date.as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn thin_pages_fail_with_no_content_extracted() {
        let html = page("", "<article><p>Subscribe to read.</p></article>");
        let err = parse_article(&html, "https://example.com/post").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::NoContentExtracted(_))
        ));
    }

    #[test]
    fn content_links_are_deduped_in_first_seen_order() {
        let filler = "words ".repeat(60);
        let body = format!(
            r#"<article><p>{}</p>
            <a href="https://a.example/1">one</a>
            <a href="https://b.example/2">two</a>
            <a href="https://a.example/1">one again</a>
            <a href="/relative">skip</a></article>"#,
            filler
        );
        let parsed = parse_article(&page("", &body), "https://example.com/post").unwrap();
        assert_eq!(parsed.links, vec!["https://a.example/1", "https://b.example/2"]);
    }

    #[test]
    fn can_handle_accepts_http_only() {
        let config = crate::config::Config::default();
        let client = fetch::build_client(&config.http).unwrap();
        let extractor = ArticleExtractor::new(client);
        assert!(extractor.can_handle("https://example.com/x"));
        assert!(extractor.can_handle("http://example.com/x"));
        assert!(!extractor.can_handle("ftp://example.com/x"));
        assert!(!extractor.can_handle("not a url"));
    }
}
