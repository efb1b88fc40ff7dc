//! Unfurl - extract and normalize content from arbitrary URLs
//!
//! This library routes a URL to a platform-specific extractor (video, article,
//! micro-post, short-form clip, podcast episode), runs that extractor's fallback
//! chain for text and metadata, optionally transcribes audio through a
//! size-limited speech-to-text endpoint, and reshapes the result into a single
//! normalized content record for downstream consumers.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod fetch;
pub mod normalize;
pub mod process;
pub mod router;
pub mod transcribe;

pub use config::Config;
pub use extractors::{ContentExtractor, ExtractedContent, ExtractorRegistry, Timestamp};
pub use normalize::{normalize, NormalizedContent};
pub use router::{route, PlatformTag, RouteResult};
pub use transcribe::{TranscriptionRequest, TranscriptionResult, Transcriber};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the extraction pipeline
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No extractor available for URL: {0}")]
    NoExtractorAvailable(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("No content could be extracted: {0}")]
    NoContentExtracted(String),

    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),
}
