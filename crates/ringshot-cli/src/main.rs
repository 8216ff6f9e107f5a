use anyhow::{Context, Result};
use clap::Parser;
use ringshot_core::{CascadeDetector, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "ringshot", about = "Frame a headshot inside the gold ring overlay")]
struct Cli {
    /// Headshot image to process (defaults to RINGSHOT_TEST_IMAGE)
    headshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    // The model is checked up front; image paths are only checked when decoded.
    let detector = CascadeDetector::from_file(&config.cascade_path)
        .context("failed to load face detection model")?;

    let headshot = match cli.headshot {
        Some(path) => path,
        None => {
            tracing::info!(path = %config.test_image.display(), "no headshot given, using test image");
            config.test_image.clone()
        }
    };

    let output = Pipeline::new(&detector, &config.ring_path)
        .run(&headshot)
        .with_context(|| format!("failed to process {}", headshot.display()))?;

    println!("Saved: {}", output.display());
    Ok(())
}
