use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixpool::application::{ChannelListener, DecodeEvent, DecodePipeline, DecodePipelineConfig};
use pixpool::domain::{DecodeListener, PoolableBuffer};
use pixpool::infrastructure::{AppConfig, CliArgs, FileKey, StorageManager};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config() -> Result<(AppConfig, Vec<std::path::PathBuf>)> {
    let mut args = CliArgs::parse();
    let inputs = std::mem::take(&mut args.inputs);

    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);

    Ok((config, inputs))
}

async fn write_thumbnail(dir: &Path, key: &FileKey, buffer: &PoolableBuffer) -> Result<()> {
    let stem = key
        .path()
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    let target = dir.join(format!("{stem}.png"));
    let image = buffer.to_display_image();

    let path = target.clone();
    tokio::task::spawn_blocking(move || image.save(&path))
        .await?
        .wrap_err_with(|| format!("Failed to write {}", target.display()))?;
    info!(path = %target.display(), "Thumbnail written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (config, inputs) = load_config()?;
    init_logging(&config)?;

    info!(version = pixpool::VERSION, inputs = inputs.len(), "Starting pixpool");

    if let Some(dir) = &config.thumbnail.output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let pipeline: DecodePipeline<FileKey> = DecodePipeline::with_defaults(DecodePipelineConfig {
        cache: config.pipeline.cache_config(),
        max_concurrent_decodes: config.pipeline.max_concurrent_decodes,
        blocking: config.pipeline.blocking,
        poll_timeout: Some(config.pipeline.poll_timeout()),
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener: Arc<dyn DecodeListener<FileKey>> = Arc::new(ChannelListener::new(tx));
    let options = config.decode_options();

    let mut pending = 0_usize;
    for path in inputs {
        let key = FileKey::new(path);
        match pipeline.request_decode_ordered(key.clone(), options, listener.clone()) {
            Ok(_) => pending += 1,
            Err(e) => warn!(key = %key, error = %e, "Skipping input"),
        }
    }
    drop(listener);

    while pending > 0 {
        let Some(event) = rx.recv().await else {
            break;
        };
        match event {
            DecodeEvent::Begin { key } => info!(key = %key, "Decoding"),
            DecodeEvent::Completed { key, result: Some(buffer) } => {
                pending -= 1;
                println!(
                    "{key}: {} (rotated {})",
                    buffer.display_size(),
                    buffer.orientation()
                );
                if let Some(dir) = &config.thumbnail.output_dir {
                    if let Err(e) = write_thumbnail(dir, &key, &buffer).await {
                        warn!(key = %key, error = %e, "Could not save thumbnail");
                    }
                }
                buffer.release()?;
            }
            DecodeEvent::Completed { key, result: None } => {
                pending -= 1;
                println!("{key}: not decodable");
            }
            DecodeEvent::Cancelled { key } => {
                pending -= 1;
                println!("{key}: cancelled");
            }
        }
    }

    println!("{}", pipeline.stats());
    Ok(())
}
