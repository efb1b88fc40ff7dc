use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::process::{ProcessRunner, TokioRunner};
use crate::router::{route, PlatformTag};
use crate::transcribe::Transcriber;
use crate::{ExtractError, Result};

pub mod article;
pub mod audioepisode;
pub mod imagevideo;
pub mod micropost;
pub mod shortvideo;
pub mod video;

/// Chapter marker parsed from free-text descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Offset from the start, in seconds
    pub time_seconds: u64,

    /// Chapter label as written in the source text
    pub label: String,
}

/// Raw output contract shared by every platform extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub platform: PlatformTag,
    pub url: String,
    pub title: String,
    pub author: String,
    pub author_url: Option<String>,
    pub date: Option<String>,
    pub duration_seconds: Option<f64>,

    /// Full text content, when any acquisition method produced one.
    /// Absence of both transcript and description is a valid terminal
    /// state, not an error.
    pub transcript: Option<String>,
    pub description: Option<String>,

    pub links: Vec<String>,
    pub timestamps: Vec<Timestamp>,
    pub thumbnail_url: Option<String>,

    /// Embed HTML passed through from upstream when one already exists;
    /// templating belongs to downstream consumers.
    pub embed_markup: Option<String>,

    /// Platform-specific fields (counts, ids) that do not participate in
    /// normalization. Never interpreted by the core.
    pub raw: serde_json::Map<String, serde_json::Value>,
}

impl ExtractedContent {
    /// Skeleton record with the fields every extractor must fill.
    pub fn new(platform: PlatformTag, url: &str, title: String, author: String) -> Self {
        Self {
            platform,
            url: url.to_string(),
            title,
            author,
            author_url: None,
            date: None,
            duration_seconds: None,
            transcript: None,
            description: None,
            links: Vec::new(),
            timestamps: Vec::new(),
            thumbnail_url: None,
            embed_markup: None,
            raw: serde_json::Map::new(),
        }
    }
}

/// Capability contract implemented by the six platform extractors.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// The platform tag this extractor serves.
    fn platform(&self) -> PlatformTag;

    /// Pure pattern check: does this extractor accept this URL shape?
    fn can_handle(&self, url: &str) -> bool;

    /// Fetch and derive content. May perform network calls, spawn external
    /// processes, and call the transcription service. Intermediate fallback
    /// attempts suppress their own failures; exhaustion or hard failures
    /// propagate.
    async fn extract(&self, url: &str) -> Result<ExtractedContent>;
}

/// A fallback tier: an async attempt that yields its result or `None`.
pub type Tier<'a, T> = Pin<Box<dyn Future<Output = Option<T>> + Send + 'a>>;

/// Evaluate fallback tiers in priority order, returning the first tier
/// that produces a value. Losing tiers are never polled, so their side
/// effects never start.
pub async fn first_success<T>(tiers: Vec<Tier<'_, T>>) -> Option<T> {
    for tier in tiers {
        if let Some(value) = tier.await {
            return Some(value);
        }
    }
    None
}

static URL_IN_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap());
static HREF_IN_HTML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="(https?://[^"]+)""#).unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static CHAPTER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:(\d{1,2}):)?(\d{1,2}):(\d{2})\s*[-–—]?\s*(\S.*)$").unwrap()
});

/// De-duplicate while preserving first-seen order.
pub fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Scrape absolute URLs from free text.
pub fn extract_links(text: &str) -> Vec<String> {
    let matches = URL_IN_TEXT
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    dedupe_preserving_order(matches)
}

/// Scrape anchor hrefs from an HTML fragment.
pub fn extract_links_from_html(html: &str) -> Vec<String> {
    let matches = HREF_IN_HTML
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect();
    dedupe_preserving_order(matches)
}

/// Parse `[h:]mm:ss label` chapter lines from a description. Best-effort;
/// order is insertion order and duplicate labels are allowed.
pub fn extract_timestamps(text: &str) -> Vec<Timestamp> {
    CHAPTER_LINE
        .captures_iter(text)
        .filter_map(|captures| {
            let hours: u64 = captures
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let minutes: u64 = captures.get(2)?.as_str().parse().ok()?;
            let seconds: u64 = captures.get(3)?.as_str().parse().ok()?;
            let label = captures.get(4)?.as_str().trim().to_string();
            if label.is_empty() {
                return None;
            }
            Some(Timestamp {
                time_seconds: hours * 3600 + minutes * 60 + seconds,
                label,
            })
        })
        .collect()
}

/// Strip markup and decode entities from an HTML snippet.
pub fn strip_tags(html: &str) -> String {
    let without_tags = TAG.replace_all(html, "");
    html_escape::decode_html_entities(&without_tags).trim().to_string()
}

/// The metadata tool reports upload dates as `YYYYMMDD`; reformat to
/// `YYYY-MM-DD`, passing anything else through untouched.
pub fn format_upload_date(date: &str) -> String {
    if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8])
    } else {
        date.to_string()
    }
}

/// Registry mapping routed platform tags to extractor instances.
pub struct ExtractorRegistry {
    extractors: HashMap<PlatformTag, Box<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    /// Build the registry with the default extractor set.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let client = crate::fetch::build_client(&config.http)?;
        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioRunner);
        let transcriber = Arc::new(Transcriber::new(
            Arc::clone(&config),
            Arc::clone(&runner),
            client.clone(),
        ));

        let mut extractors: HashMap<PlatformTag, Box<dyn ContentExtractor>> = HashMap::new();
        extractors.insert(
            PlatformTag::Video,
            Box::new(video::VideoExtractor::new(
                Arc::clone(&config),
                Arc::clone(&runner),
                Arc::clone(&transcriber),
            )),
        );
        extractors.insert(
            PlatformTag::Article,
            Box::new(article::ArticleExtractor::new(client.clone())),
        );
        extractors.insert(
            PlatformTag::Micropost,
            Box::new(micropost::MicropostExtractor::new(client.clone())),
        );
        extractors.insert(
            PlatformTag::ShortVideo,
            Box::new(shortvideo::ShortVideoExtractor::new(
                Arc::clone(&config),
                Arc::clone(&runner),
                Arc::clone(&transcriber),
            )),
        );
        extractors.insert(
            PlatformTag::ImageVideo,
            Box::new(imagevideo::ImageVideoExtractor::new(
                Arc::clone(&config),
                Arc::clone(&runner),
                Arc::clone(&transcriber),
                client.clone(),
            )),
        );
        extractors.insert(
            PlatformTag::AudioEpisode,
            Box::new(audioepisode::AudioEpisodeExtractor::new(
                Arc::clone(&config),
                Arc::clone(&runner),
                Arc::clone(&transcriber),
                client,
            )),
        );

        Ok(Self { extractors })
    }

    /// Look up the extractor for a platform tag, falling back to the
    /// article extractor when no dedicated entry exists.
    pub fn for_platform(&self, platform: PlatformTag) -> Option<&dyn ContentExtractor> {
        self.extractors
            .get(&platform)
            .or_else(|| self.extractors.get(&PlatformTag::Article))
            .map(|boxed| boxed.as_ref())
    }

    /// Route, resolve, and run the extractor for a URL.
    pub async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let routed = route(url);
        if routed.platform == PlatformTag::Unknown {
            return Err(ExtractError::InvalidUrl(routed.url).into());
        }

        let extractor = self
            .for_platform(routed.platform)
            .ok_or_else(|| ExtractError::NoExtractorAvailable(routed.url.clone()))?;

        tracing::info!(
            "Extracting {} as {}",
            routed.url,
            extractor.platform().display_name()
        );
        extractor.extract(&routed.url).await
    }

    /// Whether a URL routes to an extractor that accepts its shape.
    pub fn can_extract(&self, url: &str) -> bool {
        let routed = route(url);
        if routed.platform == PlatformTag::Unknown {
            return false;
        }
        self.for_platform(routed.platform)
            .map(|extractor| extractor.can_handle(&routed.url))
            .unwrap_or(false)
    }

    /// Platforms with a dedicated extractor entry.
    pub fn supported_platforms(&self) -> Vec<PlatformTag> {
        self.extractors.keys().copied().collect()
    }
}
