use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unfurl::cli::{Cli, Commands, OutputFormat};
use unfurl::{normalize, route, Config, ExtractorRegistry, PlatformTag};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "unfurl=debug" } else { "unfurl=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Extract { url, output, format } => {
            let config = Config::from_env();
            let registry = ExtractorRegistry::new(config)?;

            tracing::info!("Extracting content from {}", url);
            let extracted = registry.extract(&url).await?;
            let record = normalize(extracted);

            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&record)?,
                OutputFormat::Text => record.content.text.clone(),
            };

            match output {
                Some(path) => {
                    fs_err::write(&path, rendered)?;
                    eprintln!("Saved to {}", path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Route { url } => {
            let routed = route(&url);
            println!("Platform: {}", routed.platform.display_name());
            if let Some(id) = routed.id {
                println!("ID: {}", id);
            }
            println!(
                "Supported: {}",
                if routed.platform == PlatformTag::Unknown { "no" } else { "yes" }
            );
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            println!("  YouTube (youtube.com, youtu.be, shorts)");
            println!("  Articles and blog posts (any http/https page)");
            println!("  Twitter/X (twitter.com, x.com)");
            println!("  TikTok (tiktok.com, vm.tiktok.com)");
            println!("  Instagram posts and reels");
            println!("  Podcasts (direct audio URLs, Apple, Spotify, Anchor)");
        }
    }

    Ok(())
}
