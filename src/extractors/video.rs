use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{extract_links, extract_timestamps, format_upload_date, ContentExtractor, ExtractedContent};
use crate::config::Config;
use crate::fetch::TempFile;
use crate::process::ProcessRunner;
use crate::router::{self, PlatformTag};
use crate::transcribe::{Transcriber, TranscriptionRequest};
use crate::{ExtractError, Result};

/// Long-form video extractor. Metadata comes from the download tool's JSON
/// mode; the transcript tier order is captions first (manual preferred over
/// auto-generated), then speech-to-text when a credential is configured.
pub struct VideoExtractor {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    transcriber: Arc<Transcriber>,
}

static CUE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}").unwrap());
static INLINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

impl VideoExtractor {
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

    /// Fetch the tool's JSON description of the video.
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

    /// Caption tier: ask for manual subtitles first, auto-generated second,
    /// in VTT. Failure here is an attempt-level miss, not an error.
    async fn fetch_captions(&self, url: &str) -> Option<String> {
        let base = std::env::temp_dir().join(format!(
            "unfurl-subs-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));

        let mut args = self.config.cookie_args();
        args.extend([
            "--skip-download".to_string(),
            "--write-sub".to_string(),
            "--write-auto-sub".to_string(),
            "--sub-lang".to_string(),
            "en".to_string(),
            "--sub-format".to_string(),
            "vtt".to_string(),
            "-o".to_string(),
            base.to_string_lossy().to_string(),
            url.to_string(),
        ]);

        if let Err(e) = self
            .runner
            .run(&self.config.tools.yt_dlp_path, &args, self.config.http.metadata_timeout)
            .await
        {
            tracing::debug!("Caption download attempt failed: {}", e);
            return None;
        }

        for suffix in ["en", "en-US", "en-GB"] {
            let candidate = PathBuf::from(format!("{}.{}.vtt", base.to_string_lossy(), suffix));
            if candidate.exists() {
                let guard = TempFile::adopt(candidate);
                match fs_err::read_to_string(guard.path()) {
                    Ok(vtt) => return Some(clean_vtt(&vtt)),
                    Err(e) => {
                        tracing::debug!("Failed to read caption file: {}", e);
                        return None;
                    }
                }
            }
        }
        None
    }

    /// Speech-to-text tier, attempted only when captions are missing and a
    /// credential is configured.
    async fn transcribe_audio(&self, url: &str) -> Option<String> {
        if !self.transcriber.is_available() {
            return None;
        }

        tracing::info!("No captions available; attempting speech-to-text");
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
impl ContentExtractor for VideoExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Video
    }

    fn can_handle(&self, url: &str) -> bool {
        router::video_id(url).is_some()
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let video_id = router::video_id(url)
            .ok_or_else(|| ExtractError::InvalidUrl(url.to_string()))?;

        let metadata = self.fetch_metadata(url).await?;

        let mut transcript = self.fetch_captions(url).await.filter(|t| !t.is_empty());
        if transcript.is_none() {
            transcript = self.transcribe_audio(url).await.filter(|t| !t.is_empty());
        }

        let description = metadata["description"].as_str().unwrap_or_default().to_string();

        let title = metadata["title"].as_str().unwrap_or("Untitled").to_string();
        let author = metadata["channel"]
            .as_str()
            .or_else(|| metadata["uploader"].as_str())
            .unwrap_or("Unknown")
            .to_string();

        let mut content = ExtractedContent::new(PlatformTag::Video, url, title, author);
        content.author_url = metadata["channel_url"].as_str().map(String::from);
        content.date = metadata["upload_date"].as_str().map(format_upload_date);
        content.duration_seconds = metadata["duration"].as_f64();
        content.transcript = transcript;
        content.links = extract_links(&description);
        content.timestamps = extract_timestamps(&description);
        content.thumbnail_url = metadata["thumbnail"].as_str().map(String::from);
        content.raw.insert("video_id".to_string(), Value::String(video_id));
        if let Some(views) = metadata.get("view_count").cloned() {
            content.raw.insert("view_count".to_string(), views);
        }
        content.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };

        Ok(content)
    }
}

/// Reduce a VTT caption file to continuous prose: drop headers, cue timing
/// lines, and blanks; strip inline tags; collapse consecutive duplicate
/// lines, an artifact of auto-generated captions.
pub fn clean_vtt(vtt: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in vtt.lines() {
        if line.starts_with("WEBVTT")
            || line.starts_with("Kind:")
            || line.starts_with("Language:")
            || line.contains("-->")
            || CUE_LINE.is_match(line)
        {
            continue;
        }
        let cleaned = INLINE_TAG.replace_all(line, "").trim().to_string();
        if cleaned.is_empty() {
            continue;
        }
        if lines.last() != Some(&cleaned) {
            lines.push(cleaned);
        }
    }

    WHITESPACE_RUN.replace_all(&lines.join(" "), " ").trim().to_string()
}
