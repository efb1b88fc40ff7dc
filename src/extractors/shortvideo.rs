use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{extract_links, format_upload_date, ContentExtractor, ExtractedContent};
use crate::config::Config;
use crate::fetch::TempFile;
use crate::process::ProcessRunner;
use crate::router::PlatformTag;
use crate::transcribe::{Transcriber, TranscriptionRequest};
use crate::{ExtractError, Result};

/// Short-video extractor. The caption is the primary text; when a
/// speech-to-text credential is configured the spoken audio is appended
/// under a marker so both survive in one body.
pub struct ShortVideoExtractor {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    transcriber: Arc<Transcriber>,
}

static PROFILE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tiktok\.com/@([\w.-]+)/video/\d+").unwrap());

impl ShortVideoExtractor {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn ProcessRunner>,
        transcriber: Arc<Transcriber>,
    ) -> Self {
        Self {
            config,
            runner,
            transcriber,
        }
    }

    /// Metadata is mandatory here. Short links resolve through the tool,
    /// so a failure means nothing downstream can work.
    async fn fetch_metadata(&self, url: &str) -> Result<Value> {
        let mut args = self.config.cookie_args();
        args.extend([
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            url.to_string(),
        ]);

        let stdout = self
            .runner
            .run(&self.config.tools.yt_dlp_path, &args, self.config.http.metadata_timeout)
            .await
            .map_err(|e| ExtractError::UpstreamFetchFailed(e.to_string()))?
            .stdout_or_err("metadata fetch")
            .map_err(|e| ExtractError::UpstreamFetchFailed(e.to_string()))?;

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
}

#[async_trait]
impl ContentExtractor for ShortVideoExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::ShortVideo
    }

    fn can_handle(&self, url: &str) -> bool {
        url.contains("tiktok.com")
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let metadata = self.fetch_metadata(url).await?;

        // The canonical handle lives in the URL path; tool fields are the
        // fallback for short links that hide it.
        let username = PROFILE_URL
            .captures(url)
            .map(|captures| captures[1].to_string())
            .or_else(|| metadata["uploader"].as_str().map(String::from))
            .or_else(|| metadata["creator"].as_str().map(String::from))
            .unwrap_or_else(|| "unknown".to_string());

        let caption = metadata["description"]
            .as_str()
            .or_else(|| metadata["title"].as_str())
            .unwrap_or_default()
            .to_string();

        let spoken = self.transcribe_audio(url).await.filter(|t| !t.is_empty());
        let full_text = match (&caption, &spoken) {
            (c, Some(s)) if !c.is_empty() => format!("{}\n\n[Spoken content]: {}", c, s),
            (_, Some(s)) => s.clone(),
            (c, None) => c.clone(),
        };

        let title = metadata["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("TikTok by @{}", username));

        let mut content = ExtractedContent::new(PlatformTag::ShortVideo, url, title, username.clone());
        content.author_url = Some(format!("https://www.tiktok.com/@{}", username));
        content.date = metadata["upload_date"].as_str().map(format_upload_date);
        content.duration_seconds = metadata["duration"].as_f64();
        content.description = if caption.is_empty() { None } else { Some(caption) };
        content.transcript = if full_text.is_empty() { None } else { Some(full_text) };
        content.links = extract_links(content.transcript.as_deref().unwrap_or_default());
        content.thumbnail_url = metadata["thumbnail"].as_str().map(String::from);

        for key in ["view_count", "like_count", "comment_count", "repost_count"] {
            if let Some(count) = metadata.get(key).filter(|v| !v.is_null()).cloned() {
                content.raw.insert(key.to_string(), count);
            }
        }
        if let Some(id) = metadata["id"].as_str() {
            content.raw.insert("video_id".to_string(), Value::String(id.to_string()));
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{failed_output, ok_output, FakeRunner};

    fn build(runner: Arc<FakeRunner>) -> ShortVideoExtractor {
        let config = Arc::new(Config::default());
        let client = crate::fetch::build_client(&config.http).unwrap();
        let dyn_runner: Arc<dyn ProcessRunner> = runner;
        let transcriber = Arc::new(Transcriber::new(
            Arc::clone(&config),
            Arc::clone(&dyn_runner),
            client,
        ));
        ShortVideoExtractor::new(config, dyn_runner, transcriber)
    }

    #[test]
    fn handle_comes_from_the_url_first() {
        assert_eq!(
            &PROFILE_URL
                .captures("https://www.tiktok.com/@chef.ramsay/video/724")
                .unwrap()[1],
            "chef.ramsay"
        );
        assert!(PROFILE_URL.captures("https://vm.tiktok.com/ZMabc/").is_none());
    }

    #[tokio::test]
    async fn caption_only_record_without_credential() {
        let metadata = serde_json::json!({
            "id": "7241",
            "description": "Quick pasta trick https://example.com/recipe",
            "uploader": "fallbackuser",
            "upload_date": "20240310",
            "duration": 42.5,
            "thumbnail": "https://p16.tiktokcdn.com/img.jpg",
            "like_count": 900,
            "comment_count": 33,
        });
        let runner = Arc::new(FakeRunner::new().expect("yt-dlp", ok_output(&metadata.to_string())));
        let extractor = build(runner);

        let content = extractor
            .extract("https://www.tiktok.com/@cook/video/7241")
            .await
            .unwrap();

        assert_eq!(content.title, "TikTok by @cook");
        assert_eq!(content.author, "cook");
        assert_eq!(content.author_url.as_deref(), Some("https://www.tiktok.com/@cook"));
        assert_eq!(content.date.as_deref(), Some("2024-03-10"));
        assert_eq!(content.duration_seconds, Some(42.5));
        assert_eq!(
            content.transcript.as_deref(),
            Some("Quick pasta trick https://example.com/recipe")
        );
        assert_eq!(content.links, vec!["https://example.com/recipe"]);
        assert_eq!(content.raw["like_count"], 900);
        assert_eq!(content.raw["video_id"], "7241");
    }

    #[tokio::test]
    async fn metadata_failure_is_an_upstream_error() {
        let runner = Arc::new(FakeRunner::new().expect(
            "yt-dlp",
            failed_output("ERROR: Unable to resolve video"),
        ));
        let extractor = build(runner);

        let err = extractor
            .extract("https://www.tiktok.com/@cook/video/7241")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::UpstreamFetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn tool_title_used_whole_when_present() {
        let long_title = "A very long clip title that keeps going well past any \
truncation point because the source of record reported it exactly like this";
        let metadata = serde_json::json!({
            "id": "2",
            "title": long_title,
            "description": "short caption",
            "uploader": "cook",
        });
        let runner = Arc::new(FakeRunner::new().expect("yt-dlp", ok_output(&metadata.to_string())));
        let extractor = build(runner);

        let content = extractor
            .extract("https://www.tiktok.com/@cook/video/2")
            .await
            .unwrap();
        assert_eq!(content.title, long_title);
        assert_eq!(content.description.as_deref(), Some("short caption"));
    }

    #[tokio::test]
    async fn empty_caption_falls_back_to_handle_title() {
        let metadata = serde_json::json!({ "id": "1", "uploader": "cook" });
        let runner = Arc::new(FakeRunner::new().expect("yt-dlp", ok_output(&metadata.to_string())));
        let extractor = build(runner);

        let content = extractor
            .extract("https://www.tiktok.com/@cook/video/1")
            .await
            .unwrap();
        assert_eq!(content.title, "TikTok by @cook");
        assert!(content.transcript.is_none());
        assert!(content.description.is_none());
    }
}
