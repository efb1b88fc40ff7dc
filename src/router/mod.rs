use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Content-source categories a URL can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Video,
    Article,
    Micropost,
    ShortVideo,
    ImageVideo,
    AudioEpisode,
    Unknown,
}

impl PlatformTag {
    /// Human-readable platform name, used by presentation layers only.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformTag::Video => "YouTube",
            PlatformTag::Article => "Article",
            PlatformTag::Micropost => "Twitter/X",
            PlatformTag::ShortVideo => "TikTok",
            PlatformTag::ImageVideo => "Instagram",
            PlatformTag::AudioEpisode => "Podcast",
            PlatformTag::Unknown => "Unknown",
        }
    }
}

/// Outcome of routing a URL: the platform and, when the pattern captures
/// one, the platform-native identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    pub platform: PlatformTag,
    pub url: String,
    pub id: Option<String>,
}

static VIDEO_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)([a-zA-Z0-9_-]{11})",
        )
        .unwrap(),
        Regex::new(r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})").unwrap(),
    ]
});

static MICROPOST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![Regex::new(r"(?:twitter\.com|x\.com)/\w+/status/(\d+)").unwrap()]
});

static SHORTVIDEO_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"tiktok\.com/@[\w.-]+/video/(\d+)").unwrap(),
        Regex::new(r"tiktok\.com/t/(\w+)").unwrap(),
        Regex::new(r"vm\.tiktok\.com/(\w+)").unwrap(),
    ]
});

static IMAGEVIDEO_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![Regex::new(r"instagram\.com/(?:p|reel|reels)/([a-zA-Z0-9_-]+)").unwrap()]
});

static AUDIOEPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\.mp3(?:\?|$)").unwrap(),
        Regex::new(r"(?i)\.m4a(?:\?|$)").unwrap(),
        Regex::new(r"anchor\.fm").unwrap(),
        Regex::new(r"podcasts\.apple\.com").unwrap(),
        Regex::new(r"open\.spotify\.com/episode").unwrap(),
    ]
});

/// Pattern tables in evaluation order. The order is part of the contract:
/// a status link pasted inside a clip description must not steal the route
/// from a URL that matches an earlier table, so first match wins.
fn pattern_tables() -> [(PlatformTag, &'static Lazy<Vec<Regex>>); 5] {
    [
        (PlatformTag::Video, &VIDEO_PATTERNS),
        (PlatformTag::Micropost, &MICROPOST_PATTERNS),
        (PlatformTag::ShortVideo, &SHORTVIDEO_PATTERNS),
        (PlatformTag::ImageVideo, &IMAGEVIDEO_PATTERNS),
        (PlatformTag::AudioEpisode, &AUDIOEPISODE_PATTERNS),
    ]
}

/// Classify a URL into a platform tag, extracting the platform-native id
/// when a pattern captures one. Pure function; never fails on malformed
/// input, only returns `Unknown`.
pub fn route(url: &str) -> RouteResult {
    let trimmed = url.trim();

    for (platform, patterns) in pattern_tables() {
        for pattern in patterns.iter() {
            if let Some(captures) = pattern.captures(trimmed) {
                let id = captures.get(1).map(|m| m.as_str().to_string());
                return RouteResult {
                    platform,
                    url: trimmed.to_string(),
                    id,
                };
            }
        }
    }

    // Anything parseable as http(s) falls back to the article extractor
    if let Ok(parsed) = Url::parse(trimmed) {
        if matches!(parsed.scheme(), "http" | "https") {
            return RouteResult {
                platform: PlatformTag::Article,
                url: trimmed.to_string(),
                id: None,
            };
        }
    }

    RouteResult {
        platform: PlatformTag::Unknown,
        url: trimmed.to_string(),
        id: None,
    }
}

/// Extract a video id from a long-form or shorts URL.
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract a status id from a micro-post URL.
pub fn status_id(url: &str) -> Option<String> {
    MICROPOST_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
