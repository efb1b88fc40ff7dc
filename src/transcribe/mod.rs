use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fetch::{self, TempFile};
use crate::process::ProcessRunner;
use crate::{ExtractError, Result};

pub mod whisper;

pub use whisper::{SpeechToText, WhisperClient};

/// Upper bound the speech-to-text endpoint accepts for one upload.
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Segment length for chunked transcription. Ten minutes at 128 kbps is
/// roughly 10 MB, safely under the upload bound.
const CHUNK_SECONDS: &str = "600";
const CHUNK_BITRATE: &str = "128k";

/// Input to the transcription service. Exactly one of `audio_path` and
/// `audio_url` must be supplied.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionRequest {
    pub audio_path: Option<PathBuf>,
    pub audio_url: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
}

impl TranscriptionRequest {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            audio_url: Some(url.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub duration_seconds: Option<f64>,
    pub language: Option<String>,
}

/// Join chunk transcripts in segment order with single spaces and sum the
/// reported durations. A chunk whose response omits duration contributes
/// zero to the total, which under-reports long chunked transcripts; kept
/// for compatibility with downstream consumers.
pub fn assemble_chunks(
    chunks: Vec<TranscriptionResult>,
    language: Option<String>,
) -> TranscriptionResult {
    let text = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let duration: f64 = chunks
        .iter()
        .map(|chunk| chunk.duration_seconds.unwrap_or(0.0))
        .sum();

    TranscriptionResult {
        text,
        duration_seconds: Some(duration),
        language,
    }
}

/// Audio acquisition and transcription service. Downloads remote audio,
/// gates uploads on the endpoint's size limit, and splits oversized files
/// into time-bounded chunks before reassembling the transcript.
pub struct Transcriber {
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
    client: reqwest::Client,
    backend: Option<Arc<dyn SpeechToText>>,
}

impl Transcriber {
    pub fn new(config: Arc<Config>, runner: Arc<dyn ProcessRunner>, client: reqwest::Client) -> Self {
        let backend = config.speech.api_key.clone().map(|api_key| {
            Arc::new(WhisperClient::new(
                client.clone(),
                api_key,
                config.speech.endpoint.clone(),
            )) as Arc<dyn SpeechToText>
        });

        Self {
            config,
            runner,
            client,
            backend,
        }
    }

    /// Construct with an explicit backend; used by tests.
    pub fn with_backend(
        config: Arc<Config>,
        runner: Arc<dyn ProcessRunner>,
        client: reqwest::Client,
        backend: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            config,
            runner,
            client,
            backend: Some(backend),
        }
    }

    /// Whether a speech-to-text credential is configured. Extractors with
    /// a caption or description path skip transcription when this is false.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Transcribe a local file or a remote URL.
    pub async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionResult> {
        let backend = self.backend.clone().ok_or_else(|| {
            ExtractError::TranscriptionUnavailable(
                "no speech-to-text API key configured (set OPENAI_API_KEY)".to_string(),
            )
        })?;

        let language = request
            .language
            .unwrap_or_else(|| self.config.speech.language.clone());
        let model = request
            .model
            .unwrap_or_else(|| self.config.speech.model.clone());

        // Downloaded audio is owned by a guard so it is removed on every
        // exit path; caller-supplied paths stay caller-owned.
        let mut downloaded: Option<TempFile> = None;
        let path = match (request.audio_path, request.audio_url) {
            (Some(path), None) => path,
            (None, Some(url)) => {
                let guard = TempFile::new("audio", "mp3");
                fetch::download_to_file(&self.client, &url, guard.path()).await?;
                let path = guard.path().to_path_buf();
                downloaded = Some(guard);
                path
            }
            _ => anyhow::bail!("Exactly one of audio_path or audio_url must be provided"),
        };

        let result = self
            .transcribe_local(backend.as_ref(), &path, &language, &model)
            .await;
        drop(downloaded);
        result
    }

    async fn transcribe_local(
        &self,
        backend: &dyn SpeechToText,
        path: &Path,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionResult> {
        if !path.exists() {
            anyhow::bail!("Audio file not found: {}", path.display());
        }

        let size = fs_err::metadata(path)?.len();
        if size > MAX_UPLOAD_BYTES {
            tracing::info!(
                "Audio is {} bytes, over the {} byte upload bound; chunking",
                size,
                MAX_UPLOAD_BYTES
            );
            self.transcribe_chunked(backend, path, language, model).await
        } else {
            backend.transcribe_file(path, language, model).await
        }
    }

    /// Split into fixed-duration segments, transcribe each in segment
    /// order, and reassemble. The chunk directory is removed when this
    /// returns, including on failure partway through the loop.
    async fn transcribe_chunked(
        &self,
        backend: &dyn SpeechToText,
        path: &Path,
        language: &str,
        model: &str,
    ) -> Result<TranscriptionResult> {
        let chunk_dir = tempfile::Builder::new()
            .prefix("unfurl-chunks-")
            .tempdir()?;
        // Zero-padded names keep lexical order equal to temporal order
        let pattern = chunk_dir.path().join("chunk_%03d.mp3");

        let args = vec![
            "-i".to_string(),
            path.to_string_lossy().to_string(),
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            CHUNK_SECONDS.to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            CHUNK_BITRATE.to_string(),
            pattern.to_string_lossy().to_string(),
        ];
        self.runner
            .run(&self.config.tools.ffmpeg_path, &args, self.config.http.media_timeout)
            .await?
            .stdout_or_err("ffmpeg segment split")?;

        let mut chunks: Vec<PathBuf> = fs_err::read_dir(chunk_dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with("chunk_") && name.ends_with(".mp3"))
                    .unwrap_or(false)
            })
            .collect();
        chunks.sort();

        if chunks.is_empty() {
            return Err(ExtractError::TranscriptionUnavailable(
                "Failed to split audio into chunks".to_string(),
            )
            .into());
        }

        tracing::info!("Transcribing {} chunks", chunks.len());
        let mut results = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            results.push(backend.transcribe_file(chunk, language, model).await?);
        }

        Ok(assemble_chunks(results, Some(language.to_string())))
    }

    /// Extract the audio track of a local video file to a fresh temp file.
    /// The caller owns cleanup of the returned path.
    pub async fn extract_audio_from_file(&self, video_path: &Path) -> Result<PathBuf> {
        let output = fetch::temp_path("extracted", "mp3");
        let args = vec![
            "-i".to_string(),
            video_path.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            CHUNK_BITRATE.to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.runner
            .run(&self.config.tools.ffmpeg_path, &args, self.config.http.media_timeout)
            .await?
            .stdout_or_err("ffmpeg audio extraction")?;
        Ok(output)
    }

    /// Pull just the audio of a remote video through the download tool,
    /// skipping the full video download. The caller owns cleanup of the
    /// returned path.
    pub async fn extract_audio_from_url(&self, url: &str) -> Result<PathBuf> {
        let output = fetch::temp_path("ytaudio", "mp3");

        let mut args = self.config.cookie_args();
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "128K".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            url.to_string(),
        ]);
        self.runner
            .run(&self.config.tools.yt_dlp_path, &args, self.config.http.media_timeout)
            .await?
            .stdout_or_err("yt-dlp audio download")?;

        // The tool may append its own extension to the requested path
        if output.exists() {
            return Ok(output);
        }
        let with_ext = PathBuf::from(format!("{}.mp3", output.to_string_lossy()));
        if with_ext.exists() {
            return Ok(with_ext);
        }
        Err(ExtractError::UpstreamFetchFailed(format!(
            "Audio download produced no file for {}",
            url
        ))
        .into())
    }

    /// Best-effort duration probe for a local audio file.
    pub async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self
            .runner
            .run(&self.config.tools.ffprobe_path, &args, self.config.http.request_timeout)
            .await
            .ok()?;
        if !output.success {
            return None;
        }
        output.stdout.trim().parse::<f64>().ok()
    }
}
