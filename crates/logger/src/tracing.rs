use std::env::var;
use std::io;
use std::path::Path;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::rotate::{RotatingFileWriter, RotationConfig};

pub fn init() {
    initialize_tracing(LevelFilter::INFO, None);
}

/// Initialize tracing with an additional durable file layer: everything the
/// console layer sees is also written to a size-bounded rotating log file.
pub fn init_with_file(path: &Path, rotation: RotationConfig) -> io::Result<()> {
    let writer = RotatingFileWriter::create(path, rotation)?;
    initialize_tracing(LevelFilter::INFO, Some(writer));
    Ok(())
}

/// Initialize tracing subscriber with default configuration.
fn initialize_tracing(level: LevelFilter, file_writer: Option<RotatingFileWriter>) {
    let env_filter = || EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT")
        .inspect_err(|error| {
            warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}")
        })
        .unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter()).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(env_filter())
            .boxed(),
    };

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(env_filter())
            .boxed()
    });

    tracing_subscriber::registry().with(log_layer).with(file_layer).init();
}
