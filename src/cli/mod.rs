use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "unfurl",
    about = "Drop a link, get the content behind it",
    version,
    long_about = "Resolves a URL to its platform, pulls out the primary content \
(transcript, article body, post text), and prints one normalized record. \
Supports YouTube, articles, Twitter/X, TikTok, Instagram, and podcasts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract and normalize the content behind a URL
    Extract {
        /// URL to process
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Show which platform a URL routes to, without fetching anything
    Route {
        /// URL to inspect
        #[arg(value_name = "URL")]
        url: String,
    },

    /// List supported platforms
    Platforms,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Full normalized record as JSON
    Json,
    /// Body text only
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}
