use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{format_upload_date, ContentExtractor, ExtractedContent};
use crate::config::Config;
use crate::fetch::TempFile;
use crate::process::ProcessRunner;
use crate::router::PlatformTag;
use crate::transcribe::{Transcriber, TranscriptionRequest};
use crate::{ExtractError, Result};

/// Image/video post extractor. Posts may carry no media at all; reels
/// always do. Transcription runs only for posts with a positive duration.
/// When the download tool cannot see the post, oEmbed is a whole-record
/// fallback rather than a per-field one.
pub struct ImageVideoExtractor {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    transcriber: Arc<Transcriber>,
    client: reqwest::Client,
}

static POST_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"instagram\.com/(?:p|reel|reels)/([a-zA-Z0-9_-]+)").unwrap());
static REEL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/reels?/").unwrap());

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: Option<String>,
    author_name: Option<String>,
    author_url: Option<String>,
    thumbnail_url: Option<String>,
}

impl ImageVideoExtractor {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn ProcessRunner>,
        transcriber: Arc<Transcriber>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            runner,
            transcriber,
            client,
        }
    }

    async fn fetch_metadata(&self, url: &str) -> Result<Value> {
        let mut args = self.config.cookie_args();
        args.extend([
            "--skip-download".to_string(),
            "-j".to_string(),
            url.to_string(),
        ]);

        let stdout = self
            .runner
            .run(&self.config.tools.yt_dlp_path, &args, self.config.http.metadata_timeout)
            .await?
            .stdout_or_err("metadata fetch")?;

        Ok(serde_json::from_str(&stdout)?)
    }

    async fn transcribe_audio(&self, url: &str) -> Option<String> {
        if !self.transcriber.is_available() {
            return None;
        }

        let audio = match self.transcriber.extract_audio_from_url(url).await {
            Ok(path) => TempFile::adopt(path),
            Err(e) => {
                tracing::warn!("Audio download failed: {}", e);
                return None;
            }
        };

        match self
            .transcriber
            .transcribe(TranscriptionRequest::from_path(audio.path()))
            .await
        {
            Ok(result) => Some(result.text),
            Err(e) => {
                tracing::warn!("Speech-to-text failed: {}", e);
                None
            }
        }
    }

    /// oEmbed fallback for posts the tool cannot fetch. Metadata only.
    async fn extract_via_oembed(&self, url: &str) -> Result<ExtractedContent> {
        let endpoint = format!(
            "https://api.instagram.com/oembed?url={}",
            urlencoding::encode(url)
        );
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| ExtractError::UpstreamFetchFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExtractError::NoContentExtracted(format!(
                "{}: post is not visible to either the download tool or oEmbed",
                url
            ))
            .into());
        }
        let oembed: OEmbedResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::UpstreamFetchFailed(e.to_string()))?;

        let author = oembed.author_name.unwrap_or_else(|| "unknown".to_string());
        let mut content = ExtractedContent::new(
            PlatformTag::ImageVideo,
            url,
            oembed.title.clone().unwrap_or_else(|| "Instagram Post".to_string()),
            author,
        );
        content.author_url = oembed.author_url;
        content.thumbnail_url = oembed.thumbnail_url;
        content.description = oembed.title;
        Ok(content)
    }
}

#[async_trait]
impl ContentExtractor for ImageVideoExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::ImageVideo
    }

    fn can_handle(&self, url: &str) -> bool {
        POST_URL.is_match(url)
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let is_reel = REEL_PATH.is_match(url);

        let metadata = match self.fetch_metadata(url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!("Tool metadata failed, trying oEmbed: {}", e);
                return self.extract_via_oembed(url).await;
            }
        };

        let username = metadata["uploader"]
            .as_str()
            .or_else(|| metadata["channel"].as_str())
            .unwrap_or("unknown")
            .to_string();
        let caption = metadata["description"]
            .as_str()
            .or_else(|| metadata["title"].as_str())
            .unwrap_or_default()
            .to_string();

        // Image-only posts report no duration; skip the audio path for them.
        let duration = metadata["duration"].as_f64().filter(|d| *d > 0.0);
        let spoken = if duration.is_some() {
            self.transcribe_audio(url).await.filter(|t| !t.is_empty())
        } else {
            None
        };

        let full_text = match (&caption, &spoken) {
            (c, Some(s)) if !c.is_empty() => format!("{}\n\n[Spoken content]: {}", c, s),
            (_, Some(s)) => s.clone(),
            (c, None) => c.clone(),
        };

        let title = metadata["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| {
                format!("{} by @{}", if is_reel { "Reel" } else { "Post" }, username)
            });

        let mut content = ExtractedContent::new(PlatformTag::ImageVideo, url, title, username.clone());
        content.author_url = Some(format!("https://instagram.com/{}", username));
        content.date = metadata["upload_date"].as_str().map(format_upload_date);
        content.duration_seconds = duration;
        content.description = if caption.is_empty() { None } else { Some(caption) };
        content.transcript = if full_text.is_empty() { None } else { Some(full_text) };
        content.thumbnail_url = metadata["thumbnail"].as_str().map(String::from);

        if let Some(id) = metadata["id"].as_str() {
            content.raw.insert("post_id".to_string(), Value::String(id.to_string()));
        }
        for key in ["like_count", "comment_count"] {
            if let Some(count) = metadata.get(key).filter(|v| !v.is_null()).cloned() {
                content.raw.insert(key.to_string(), count);
            }
        }
        content.raw.insert("is_reel".to_string(), Value::Bool(is_reel));

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{ok_output, FakeRunner};

    fn build(runner: Arc<FakeRunner>) -> ImageVideoExtractor {
        let config = Arc::new(Config::default());
        let client = crate::fetch::build_client(&config.http).unwrap();
        let dyn_runner: Arc<dyn ProcessRunner> = runner;
        let transcriber = Arc::new(Transcriber::new(
            Arc::clone(&config),
            Arc::clone(&dyn_runner),
            client.clone(),
        ));
        ImageVideoExtractor::new(config, dyn_runner, transcriber, client)
    }

    #[test]
    fn recognizes_post_and_reel_urls() {
        let runner = Arc::new(FakeRunner::new());
        let extractor = build(runner);
        assert!(extractor.can_handle("https://www.instagram.com/p/Cxyz_12-a/"));
        assert!(extractor.can_handle("https://www.instagram.com/reel/Cabc123/"));
        assert!(extractor.can_handle("https://www.instagram.com/reels/Cabc123/"));
        assert!(!extractor.can_handle("https://www.instagram.com/someuser/"));
    }

    #[tokio::test]
    async fn image_post_skips_the_audio_path() {
        let metadata = serde_json::json!({
            "id": "C123",
            "description": "Golden hour",
            "uploader": "photographer",
            "upload_date": "20240615",
            "thumbnail": "https://scontent.cdninstagram.com/img.jpg",
            "like_count": 4000,
            "comment_count": 87,
        });
        // one scripted call only: a duration-less post must never spawn ffmpeg
        let runner = Arc::new(FakeRunner::new().expect("yt-dlp", ok_output(&metadata.to_string())));
        let extractor = build(Arc::clone(&runner));

        let content = extractor
            .extract("https://www.instagram.com/p/C123/")
            .await
            .unwrap();

        assert_eq!(content.title, "Post by @photographer");
        assert_eq!(content.author_url.as_deref(), Some("https://instagram.com/photographer"));
        assert_eq!(content.date.as_deref(), Some("2024-06-15"));
        assert!(content.duration_seconds.is_none());
        assert_eq!(content.transcript.as_deref(), Some("Golden hour"));
        assert_eq!(content.raw["post_id"], "C123");
        assert_eq!(content.raw["is_reel"], false);
        assert_eq!(runner.call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reel_is_flagged_in_raw_metadata() {
        let metadata = serde_json::json!({
            "id": "R456",
            "title": "Morning run",
            "uploader": "runner",
            "duration": 31.0,
        });
        let runner = Arc::new(FakeRunner::new().expect("yt-dlp", ok_output(&metadata.to_string())));
        let extractor = build(runner);

        let content = extractor
            .extract("https://www.instagram.com/reel/R456/")
            .await
            .unwrap();

        assert_eq!(content.title, "Morning run");
        assert_eq!(content.duration_seconds, Some(31.0));
        assert_eq!(content.raw["is_reel"], true);
    }
}
