use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{extract_links, first_success, strip_tags, ContentExtractor, ExtractedContent, Tier};
use crate::router::PlatformTag;
use crate::{ExtractError, Result};

/// Micro-post (status/thread) extractor. The platform blocks anonymous
/// scraping, so three independent tiers are tried strictly in order:
/// mirror front-ends, the public syndication endpoint, then oEmbed. The
/// first tier that produces a body wins.
pub struct MicropostExtractor {
    client: reqwest::Client,
    mirror_bases: Vec<String>,
    syndication_base: String,
    oembed_base: String,
}

/// Mirror hosts tried in order by tier one.
const MIRROR_HOSTS: &[&str] = &[
    "https://nitter.poast.org",
    "https://nitter.privacydev.net",
    "https://nitter.woodland.cafe",
];

const SYNDICATION_BASE: &str = "https://cdn.syndication.twimg.com";
const OEMBED_BASE: &str = "https://publish.twitter.com";

static STATUS_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:twitter\.com|x\.com)/(\w+)/status/(\d+)").unwrap());
static MIRROR_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<div class="tweet-content[^"]*"[^>]*>(.*?)</div>"#).unwrap());
static MIRROR_USERNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a class="username"[^>]*>@(\w+)</a>"#).unwrap());
static MIRROR_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<span class="tweet-date"[^>]*><a[^>]*title="([^"]+)""#).unwrap());
static OEMBED_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap());

#[derive(Debug, Clone)]
struct PostData {
    author: String,
    text: String,
    date: Option<String>,
    likes: Option<i64>,
    reposts: Option<i64>,
    replies: Option<i64>,
    thread_texts: Vec<String>,
    embed_html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyndicationTweet {
    text: Option<String>,
    user: Option<SyndicationUser>,
    created_at: Option<String>,
    favorite_count: Option<i64>,
    retweet_count: Option<i64>,
    reply_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SyndicationUser {
    screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    html: Option<String>,
    author_name: Option<String>,
}

impl MicropostExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            mirror_bases: MIRROR_HOSTS.iter().map(|host| host.to_string()).collect(),
            syndication_base: SYNDICATION_BASE.to_string(),
            oembed_base: OEMBED_BASE.to_string(),
        }
    }

    /// Construct against explicit endpoint bases; used by tests.
    #[cfg(test)]
    fn with_endpoints(
        client: reqwest::Client,
        mirror_bases: Vec<String>,
        syndication_base: String,
        oembed_base: String,
    ) -> Self {
        Self {
            client,
            mirror_bases,
            syndication_base,
            oembed_base,
        }
    }

    /// Tier one: privacy-respecting mirror front-ends, several hosts.
    async fn from_mirror(&self, username: String, status_id: String) -> Option<PostData> {
        for host in &self.mirror_bases {
            let url = format!("{}/{}/status/{}", host, username, status_id);
            let response = match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::debug!("Mirror {} answered HTTP {}", host, response.status());
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Mirror {} unreachable: {}", host, e);
                    continue;
                }
            };
            let html = match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    tracing::debug!("Mirror {} body read failed: {}", host, e);
                    continue;
                }
            };
            if let Some(data) = parse_mirror_page(&html, &username) {
                return Some(data);
            }
        }
        None
    }

    /// Tier two: the platform's public syndication endpoint, which also
    /// carries engagement counts.
    async fn from_syndication(&self, status_id: String) -> Option<PostData> {
        let url = format!(
            "{}/tweet-result?id={}&lang=en",
            self.syndication_base, status_id
        );
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            tracing::debug!("Syndication endpoint answered HTTP {}", response.status());
            return None;
        }
        let tweet: SyndicationTweet = response.json().await.ok()?;
        let text = tweet.text?;

        Some(PostData {
            author: tweet
                .user
                .and_then(|u| u.screen_name)
                .unwrap_or_else(|| "unknown".to_string()),
            text,
            date: tweet.created_at,
            likes: tweet.favorite_count,
            reposts: tweet.retweet_count,
            replies: tweet.reply_count,
            thread_texts: Vec::new(),
            embed_html: None,
        })
    }

    /// Tier three: oEmbed, which yields only a markup snippet.
    async fn from_oembed(&self, url: String) -> Option<PostData> {
        let endpoint = format!(
            "{}/oembed?url={}",
            self.oembed_base,
            urlencoding::encode(&url)
        );
        let response = self.client.get(&endpoint).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let oembed: OEmbedResponse = response.json().await.ok()?;
        let html = oembed.html?;

        let text = OEMBED_BODY
            .captures(&html)
            .map(|captures| strip_tags(&captures[1]))
            .unwrap_or_default();
        if text.is_empty() {
            return None;
        }

        Some(PostData {
            author: oembed.author_name.unwrap_or_else(|| "unknown".to_string()),
            text,
            date: None,
            likes: None,
            reposts: None,
            replies: None,
            thread_texts: Vec::new(),
            embed_html: Some(html),
        })
    }
}

#[async_trait]
impl ContentExtractor for MicropostExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Micropost
    }

    fn can_handle(&self, url: &str) -> bool {
        STATUS_URL.is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let captures = STATUS_URL
            .captures(url)
            .ok_or_else(|| ExtractError::InvalidUrl(url.to_string()))?;
        let username = captures[1].to_string();
        let status_id = captures[2].to_string();

        let tiers: Vec<Tier<'_, PostData>> = vec![
            Box::pin(self.from_mirror(username.clone(), status_id.clone())),
            Box::pin(self.from_syndication(status_id.clone())),
            Box::pin(self.from_oembed(url.to_string())),
        ];
        let data = first_success(tiers).await.ok_or_else(|| {
            ExtractError::NoContentExtracted(format!(
                "{}: every acquisition tier came back empty; the platform may be blocking access",
                url
            ))
        })?;

        let is_thread = data.thread_texts.len() > 1;

        let mut content = ExtractedContent::new(
            PlatformTag::Micropost,
            url,
            format!("Post by @{}", data.author),
            data.author.clone(),
        );
        content.author_url = Some(format!("https://twitter.com/{}", data.author));
        content.date = data.date;
        content.description = Some(data.text.chars().take(280).collect());
        content.links = extract_links(&data.text);
        content.embed_markup = data.embed_html;
        content.transcript = Some(data.text);

        content.raw.insert("status_id".into(), status_id.into());
        content.raw.insert("is_thread".into(), is_thread.into());
        if let Some(likes) = data.likes {
            content.raw.insert("likes".into(), likes.into());
        }
        if let Some(reposts) = data.reposts {
            content.raw.insert("reposts".into(), reposts.into());
        }
        if let Some(replies) = data.replies {
            content.raw.insert("replies".into(), replies.into());
        }
        if is_thread {
            content.raw.insert(
                "thread_texts".into(),
                serde_json::Value::Array(
                    data.thread_texts.into_iter().map(Into::into).collect(),
                ),
            );
        }

        Ok(content)
    }
}

/// Parse a mirror front-end's rendered status page. More than one body
/// block means a thread; thread texts join with a visible separator.
fn parse_mirror_page(html: &str, fallback_user: &str) -> Option<PostData> {
    let bodies: Vec<String> = MIRROR_BODY
        .captures_iter(html)
        .map(|captures| strip_tags(&captures[1]))
        .filter(|body| !body.is_empty())
        .collect();
    if bodies.is_empty() {
        return None;
    }

    let author = MIRROR_USERNAME
        .captures(html)
        .map(|captures| captures[1].to_string())
        .unwrap_or_else(|| fallback_user.to_string());
    let date = MIRROR_DATE.captures(html).map(|captures| captures[1].to_string());

    let text = if bodies.len() > 1 {
        bodies.join("\n\n---\n\n")
    } else {
        bodies[0].clone()
    };

    Some(PostData {
        author,
        text,
        date,
        likes: None,
        reposts: None,
        replies: None,
        thread_texts: bodies,
        embed_html: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_status_urls_only() {
        let extractor = MicropostExtractor::new(reqwest::Client::new());
        assert!(extractor.can_handle("https://twitter.com/rustlang/status/123"));
        assert!(extractor.can_handle("https://x.com/rustlang/status/123"));
        assert!(!extractor.can_handle("https://x.com/rustlang"));
    }

    #[test]
    fn parses_single_post_from_mirror_html() {
        let html = r#"
            <a class="username" href="/jane">@jane</a>
            <span class="tweet-date"><a href="/jane/status/1" title="Mar 5, 2024 · 10:15 AM UTC">x</a></span>
            <div class="tweet-content media-body" dir="auto">Shipping v1.0 &amp; notes at <a href="https://example.com">example.com</a></div>
        "#;
        let data = parse_mirror_page(html, "fallback").unwrap();
        assert_eq!(data.author, "jane");
        assert_eq!(data.date.as_deref(), Some("Mar 5, 2024 · 10:15 AM UTC"));
        assert_eq!(data.text, "Shipping v1.0 & notes at example.com");
        assert_eq!(data.thread_texts.len(), 1);
    }

    #[test]
    fn multiple_body_blocks_become_a_joined_thread() {
        let html = r#"
            <div class="tweet-content">First part</div>
            <div class="tweet-content">Second part</div>
        "#;
        let data = parse_mirror_page(html, "jane").unwrap();
        assert_eq!(data.text, "First part\n\n---\n\nSecond part");
        assert_eq!(data.thread_texts, vec!["First part", "Second part"]);
        assert_eq!(data.author, "jane");
    }

    #[test]
    fn empty_mirror_page_is_a_miss_not_an_error() {
        assert!(parse_mirror_page("<html><body>rate limited</body></html>", "jane").is_none());
    }

    /// One-shot HTTP stub on a loopback port answering every request with
    /// the given body and recording each request path.
    async fn spawn_stub(body: &'static str) -> (String, std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let paths = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let seen = paths.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(path);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (base, paths)
    }

    #[tokio::test]
    async fn winning_mirror_tier_keeps_later_tiers_unpolled() {
        let html = r#"
            <a class="username" href="/jane">@jane</a>
            <div class="tweet-content">Release day!</div>
        "#;
        let (base, paths) = spawn_stub(html).await;

        // Every tier points at the same stub; request paths tell them apart
        let extractor = MicropostExtractor::with_endpoints(
            reqwest::Client::new(),
            vec![base.clone()],
            base.clone(),
            base,
        );

        let content = extractor
            .extract("https://twitter.com/jane/status/777")
            .await
            .unwrap();
        assert_eq!(content.transcript.as_deref(), Some("Release day!"));
        assert_eq!(content.author, "jane");

        let paths = paths.lock().unwrap();
        assert_eq!(paths.len(), 1, "only the mirror tier may issue a request");
        assert_eq!(paths[0], "/jane/status/777");
    }

    #[tokio::test]
    async fn empty_mirror_answer_falls_through_to_syndication() {
        let (base, paths) = spawn_stub("<html><body>rate limited</body></html>").await;

        let extractor = MicropostExtractor::with_endpoints(
            reqwest::Client::new(),
            vec![base.clone()],
            base.clone(),
            base,
        );

        // The stub serves HTML everywhere, so tiers two and three both miss
        let err = extractor
            .extract("https://twitter.com/jane/status/778")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::NoContentExtracted(_))
        ));

        let paths = paths.lock().unwrap();
        assert_eq!(paths.len(), 3, "all three tiers tried in order");
        assert_eq!(paths[0], "/jane/status/778");
        assert!(paths[1].starts_with("/tweet-result"));
        assert!(paths[2].starts_with("/oembed"));
    }

    #[test]
    fn oembed_body_regex_strips_markup() {
        let html = r#"<blockquote class="twitter-tweet"><p lang="en" dir="ltr">Hello &amp; welcome</p>&mdash; Jane</blockquote>"#;
        let captures = OEMBED_BODY.captures(html).unwrap();
        assert_eq!(strip_tags(&captures[1]), "Hello & welcome");
    }
}
