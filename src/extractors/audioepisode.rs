use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::{ContentExtractor, ExtractedContent};
use crate::config::Config;
use crate::fetch::{download_to_file, fetch_text, TempFile};
use crate::process::ProcessRunner;
use crate::router::PlatformTag;
use crate::transcribe::{Transcriber, TranscriptionRequest};
use crate::{ExtractError, Result};

/// Audio episode extractor with three branches: direct audio files are
/// downloaded and transcribed, the streaming platform that withholds audio
/// gets a metadata-only page scrape, and everything else goes through the
/// download tool.
pub struct AudioEpisodeExtractor {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    transcriber: Arc<Transcriber>,
    client: reqwest::Client,
}

static DIRECT_AUDIO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mp3|m4a|wav|ogg|opus)(?:\?|$)").unwrap());
static PAGE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title>([^<]+)</title>").unwrap());
static PAGE_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<meta name="description" content="([^"]+)""#).unwrap());

impl AudioEpisodeExtractor {
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

    /// Direct audio file: download, probe the duration, transcribe. The
    /// title comes from the filename and the author from the host.
    async fn extract_direct(&self, url: &str) -> Result<ExtractedContent> {
        let parsed = Url::parse(url).map_err(|_| ExtractError::InvalidUrl(url.to_string()))?;
        let host = parsed.host_str().unwrap_or("unknown").to_string();
        let title = filename_title(&parsed);

        let audio = TempFile::new("episode", "mp3");
        download_to_file(&self.client, url, audio.path()).await?;

        let duration = self.transcriber.probe_duration(audio.path()).await;

        let transcript = if self.transcriber.is_available() {
            tracing::info!("Transcribing episode audio; long episodes take a while");
            match self
                .transcriber
                .transcribe(TranscriptionRequest::from_path(audio.path()))
                .await
            {
                Ok(result) => Some(result.text),
                Err(e) => {
                    tracing::warn!("Transcription failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut content = ExtractedContent::new(PlatformTag::AudioEpisode, url, title, host);
        content.duration_seconds = duration;
        content.transcript = transcript;
        Ok(content)
    }

    /// The streaming platform exposes no audio without its API, so this
    /// branch is metadata-only by design of the upstream service.
    async fn extract_streaming_page(&self, url: &str) -> Result<ExtractedContent> {
        let html = fetch_text(&self.client, url).await?;

        let title = PAGE_TITLE
            .captures(&html)
            .map(|captures| {
                captures[1]
                    .replace(" | Podcast on Spotify", "")
                    .trim()
                    .to_string()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Podcast Episode".to_string());
        let description = PAGE_DESCRIPTION
            .captures(&html)
            .map(|captures| captures[1].to_string());

        let mut content =
            ExtractedContent::new(PlatformTag::AudioEpisode, url, title, "Spotify".to_string());
        content.description = description;
        Ok(content)
    }

    /// Generic platform: best-effort metadata, then audio through the
    /// download tool. Missing metadata is not fatal here.
    async fn extract_generic(&self, url: &str) -> Result<ExtractedContent> {
        let metadata = self.fetch_metadata(url).await.unwrap_or_else(|e| {
            tracing::debug!("Episode metadata unavailable: {}", e);
            Value::Null
        });

        let title = metadata["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .unwrap_or("Podcast Episode")
            .to_string();
        let author = metadata["uploader"]
            .as_str()
            .or_else(|| metadata["channel"].as_str())
            .unwrap_or("Unknown")
            .to_string();

        let transcript = if self.transcriber.is_available() {
            match self.transcriber.extract_audio_from_url(url).await {
                Ok(path) => {
                    let audio = TempFile::adopt(path);
                    match self
                        .transcriber
                        .transcribe(TranscriptionRequest::from_path(audio.path()))
                        .await
                    {
                        Ok(result) => Some(result.text),
                        Err(e) => {
                            tracing::warn!("Transcription failed: {}", e);
                            None
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Episode audio download failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut content = ExtractedContent::new(PlatformTag::AudioEpisode, url, title, author);
        content.duration_seconds = metadata["duration"].as_f64();
        content.description = metadata["description"].as_str().map(String::from);
        content.transcript = transcript;
        content.thumbnail_url = metadata["thumbnail"].as_str().map(String::from);
        Ok(content)
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
}

#[async_trait]
impl ContentExtractor for AudioEpisodeExtractor {
    fn platform(&self) -> PlatformTag {
        PlatformTag::AudioEpisode
    }

    fn can_handle(&self, url: &str) -> bool {
        DIRECT_AUDIO.is_match(url)
            || url.contains("anchor.fm")
            || url.contains("podcasts.apple.com")
            || url.contains("open.spotify.com/episode")
    }

    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        if DIRECT_AUDIO.is_match(url) {
            return self.extract_direct(url).await;
        }
        if url.contains("spotify.com") {
            return self.extract_streaming_page(url).await;
        }
        self.extract_generic(url).await
    }
}

/// Derive a readable title from the final path segment of an audio URL.
fn filename_title(url: &Url) -> String {
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("podcast");
    let stem = DIRECT_AUDIO.replace(filename, "");
    let decoded = urlencoding::decode(&stem)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| stem.to_string());
    let title = decoded.replace(['-', '_'], " ").trim().to_string();
    if title.is_empty() {
        "Podcast Episode".to_string()
    } else {
        title
    }
}
