use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, threaded explicitly into constructors so the
/// pipeline can be exercised with fakes. Secrets arrive already resolved;
/// this module does not manage config files.
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech-to-text settings
    pub speech: SpeechConfig,

    /// External tool paths
    pub tools: ToolsConfig,

    /// Outbound HTTP settings
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// API key for the speech-to-text endpoint. Absent key means extractors
    /// skip transcript acquisition wherever another content source exists.
    pub api_key: Option<String>,

    /// Transcription endpoint URL
    pub endpoint: String,

    /// Model identifier sent with each upload
    pub model: String,

    /// Default language code
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Path to the metadata/download tool (yt-dlp)
    pub yt_dlp_path: String,

    /// Path to the media transcode tool (ffmpeg)
    pub ffmpeg_path: String,

    /// Path to the media probe tool (ffprobe)
    pub ffprobe_path: String,

    /// Optional cookies file handed to yt-dlp when present on disk
    pub cookies_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent sent on page fetches; some platforms reject obvious bots
    pub user_agent: String,

    /// Timeout for ordinary page and API fetches
    pub request_timeout: Duration,

    /// Timeout for metadata tool invocations; long videos need headroom
    pub metadata_timeout: Duration,

    /// Timeout for audio downloads and transcode subprocesses
    pub media_timeout: Duration,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

impl Default for Config {
    fn default() -> Self {
        Self {
            speech: SpeechConfig {
                api_key: None,
                endpoint: DEFAULT_ENDPOINT.to_string(),
                model: "whisper-1".to_string(),
                language: "en".to_string(),
            },
            tools: ToolsConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                cookies_path: None,
            },
            http: HttpConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                request_timeout: Duration::from_secs(30),
                metadata_timeout: Duration::from_secs(120),
                media_timeout: Duration::from_secs(600),
            },
        }
    }
}

impl Config {
    /// Build configuration from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.speech.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

        if let Ok(model) = std::env::var("UNFURL_WHISPER_MODEL") {
            config.speech.model = model;
        }
        if let Ok(language) = std::env::var("UNFURL_WHISPER_LANGUAGE") {
            config.speech.language = language;
        }
        if let Ok(path) = std::env::var("UNFURL_YTDLP_PATH") {
            config.tools.yt_dlp_path = path;
        }
        if let Ok(path) = std::env::var("UNFURL_FFMPEG_PATH") {
            config.tools.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("UNFURL_FFPROBE_PATH") {
            config.tools.ffprobe_path = path;
        }

        let cookies = std::env::var("UNFURL_COOKIES_PATH")
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config/yt-dlp/cookies.txt"))
            });
        config.tools.cookies_path = cookies;

        config
    }

    /// Cookie argument for yt-dlp invocations, present only when the
    /// configured cookies file actually exists.
    pub fn cookie_args(&self) -> Vec<String> {
        match &self.tools.cookies_path {
            Some(path) if path.exists() => {
                vec!["--cookies".to_string(), path.to_string_lossy().to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Whether a speech-to-text credential is configured.
    pub fn transcription_enabled(&self) -> bool {
        self.speech.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_credential() {
        let config = Config::default();
        assert!(!config.transcription_enabled());
        assert_eq!(config.speech.model, "whisper-1");
    }

    #[test]
    fn cookie_args_empty_when_file_missing() {
        let mut config = Config::default();
        config.tools.cookies_path = Some(PathBuf::from("/nonexistent/cookies.txt"));
        assert!(config.cookie_args().is_empty());
    }

    #[test]
    fn cookie_args_present_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        fs_err::write(&path, "# netscape cookies").unwrap();

        let mut config = Config::default();
        config.tools.cookies_path = Some(path.clone());

        let args = config.cookie_args();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], "--cookies");
        assert_eq!(args[1], path.to_string_lossy());
    }
}
