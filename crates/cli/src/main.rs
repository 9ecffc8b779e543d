//! Command line front end: load images and inspect the disk caches.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use sketch::request::{CachePolicy, Size};
use sketch::transform::RotateTransformation;
use sketch::{ImageResult, Request, Sketch};
use sketch_config::Config;
use sketch_image::Image;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "sketch=info";

/// Load images through the sketch pipeline.
#[derive(Parser, Debug)]
#[command(name = "sketch", version, about)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one or more images concurrently and report where each came from
    Load {
        #[arg(required = true)]
        uris: Vec<String>,

        /// Target size, e.g. 300x200
        #[arg(long)]
        size: Option<Size>,

        /// Rotate clockwise by a multiple of 90 degrees
        #[arg(long, value_parser = parse_rotation, allow_hyphen_values = true)]
        rotate: Option<RotateTransformation>,

        /// Bypass the memory and disk caches
        #[arg(long)]
        no_cache: bool,
    },
    /// Inspect or clear the disk caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print entry counts and sizes
    Stats,
    /// Remove every cached entry
    Clear,
}

fn parse_rotation(value: &str) -> std::result::Result<RotateTransformation, String> {
    let degrees: i32 = value.parse().map_err(|_| format!("{value:?} is not a number of degrees"))?;
    RotateTransformation::new(degrees).ok_or_else(|| format!("{degrees} is not a multiple of 90"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn build(config: Option<PathBuf>) -> Result<Sketch> {
    let config = Config::load(config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(?config, "loaded configuration");
    Sketch::builder(config).build().or_raise(|| ErrorKind::Startup)
}

fn describe(uri: &str, result: &ImageResult) -> String {
    match result {
        ImageResult::Success(data) => {
            let info = data.info();
            let mut line = format!(
                "{uri}: {}x{} {} decoded to {}x{} from {}",
                info.width,
                info.height,
                info.format,
                data.image().width(),
                data.image().height(),
                data.data_from(),
            );
            if !data.transformations().is_empty() {
                line.push_str(&format!(" [{}]", data.transformations().join(", ")));
            }
            line
        },
        ImageResult::Error(err) => format!("{uri}: error: {err:?}"),
        ImageResult::Cancelled => format!("{uri}: cancelled"),
    }
}

async fn load(
    sketch: &Sketch,
    uris: Vec<String>,
    size: Option<Size>,
    rotate: Option<RotateTransformation>,
    no_cache: bool,
) -> Result<()> {
    let requests = uris.iter().map(|uri| {
        let mut builder = Request::builder(uri.as_str());
        if let Some(size) = size {
            builder = builder.size(size);
        }
        if let Some(rotate) = rotate {
            builder = builder.transformation(rotate);
        }
        if no_cache {
            builder = builder
                .memory_cache_policy(CachePolicy::Disabled)
                .result_cache_policy(CachePolicy::Disabled)
                .download_cache_policy(CachePolicy::Disabled);
        }
        sketch.execute(builder.build())
    });
    let results = futures::future::join_all(requests).await;

    let mut failed = 0;
    for (uri, result) in uris.iter().zip(&results) {
        println!("{}", describe(uri, result));
        if !result.is_success() {
            failed += 1;
        }
    }
    if failed > 0 {
        exn::bail!(ErrorKind::Failed(failed, results.len()));
    }
    Ok(())
}

fn stats(sketch: &Sketch) {
    for (name, cache) in [("download", sketch.download_cache()), ("result", sketch.result_cache())] {
        if !cache.is_available() {
            println!("{name}: unavailable");
            continue;
        }
        println!(
            "{name}: {} entries, {} of {} bytes in {}",
            cache.len(),
            cache.size(),
            cache.max_size(),
            cache.directory().display(),
        );
    }
}

async fn run(args: Args) -> Result<()> {
    let sketch = build(args.config)?;
    match args.command {
        Command::Load { uris, size, rotate, no_cache } => load(&sketch, uris, size, rotate, no_cache).await,
        Command::Cache { action: CacheAction::Stats } => {
            stats(&sketch);
            Ok(())
        },
        Command::Cache { action: CacheAction::Clear } => {
            sketch.clear_caches().or_raise(|| ErrorKind::Clear)?;
            println!("caches cleared");
            Ok(())
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
