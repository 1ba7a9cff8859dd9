// Main entry point for the photo-converter server.
// Parses configuration, sets up logging and the ingestion pipeline,
// configures the Axum router and serves until a shutdown signal arrives.

mod shutdown_signal;
#[cfg(test)]
mod test_helpers;
mod upload;
mod web;

use axum::http::HeaderValue;
use clap::Parser;
use shutdown_signal::shutdown_signal;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;
use upload::{
    Orchestrator, Pipeline,
    image_codec::{OutputCodec, OutputFormat},
    pool::RenderPool,
    storage::StorageLayout,
};
use web::{AppState, IdentityVerifier, ReadAccess, WebSettings};

/// Command line arguments for photo-converter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "PHOTO_CONVERTER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "PHOTO_CONVERTER_PORT", default_value_t = 55555)]
    port: u16,

    /// Root directory where uploaded images are saved.
    #[arg(long, env = "PHOTO_CONVERTER_SAVE_LOCATION", default_value = "static")]
    save_location: PathBuf,

    /// URL to redirect requests for `/` to. Without it `/` answers 404.
    #[arg(long, env = "PHOTO_CONVERTER_REDIRECT_URL")]
    redirect_url: Option<String>,

    /// URL to submit saved image locations to. Accepted for compatibility, not used.
    #[arg(long, env = "PHOTO_CONVERTER_SUBMIT_URL")]
    submit_url: Option<String>,

    /// HS256 secret used to verify bearer tokens. Without it every request is anonymous.
    #[arg(long, env = "PHOTO_CONVERTER_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Origin allowed to make cross-origin requests. Repeat for several origins.
    #[arg(long = "allowed-origin", env = "PHOTO_CONVERTER_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Largest upload request body accepted, in bytes. Larger bodies are answered with 413.
    #[arg(long, env = "PHOTO_CONVERTER_MAX_UPLOAD_BYTES", default_value_t = web::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// File bytes per request kept in memory; further file parts are spooled to temporary files.
    #[arg(long, env = "PHOTO_CONVERTER_MULTIPART_MEMORY_BYTES", default_value_t = web::DEFAULT_MULTIPART_MEMORY_BYTES)]
    multipart_memory_bytes: usize,

    /// Maximum number of decode/render jobs running at once across all requests.
    /// Defaults to the number of available CPUs.
    #[arg(long, env = "PHOTO_CONVERTER_MAX_CONCURRENT_RENDERS")]
    max_concurrent_renders: Option<usize>,

    /// Maximum number of uploads holding decoded pixels at once across all requests.
    /// Defaults to the render pool capacity.
    #[arg(long, env = "PHOTO_CONVERTER_MAX_DECODED_IMAGES")]
    max_decoded_images: Option<usize>,

    /// Codec used for every stored variant.
    #[arg(long, env = "PHOTO_CONVERTER_OUTPUT_FORMAT", value_enum, default_value_t = OutputCodec::Jpeg)]
    output_format: OutputCodec,

    /// JPEG quality for resized variants (the original is always stored at 100).
    #[arg(long, env = "PHOTO_CONVERTER_JPEG_QUALITY", default_value_t = OutputFormat::DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Who may read files stored under a user's directory.
    #[arg(long, env = "PHOTO_CONVERTER_READ_ACCESS", value_enum, default_value_t = ReadAccess::Public)]
    read_access: ReadAccess,

    /// Include failed files (with their error) in the upload response.
    #[arg(long, env = "PHOTO_CONVERTER_REPORT_FAILURES", action = clap::ArgAction::SetTrue)]
    report_failures: bool,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Initialize tracing subscriber for structured logging.
    // RUST_LOG overrides the default `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true) // Include module path in logs
        .with_file(true) // Include source file name
        .with_line_number(true) // Include line numbers
        .init();

    tracing::info!("Starting photo-converter...");

    if let Err(e) = tokio::fs::create_dir_all(&config.save_location).await {
        tracing::error!(
            "FATAL: Cannot create save location {}: {}",
            config.save_location.display(),
            e
        );
        std::process::exit(1);
    }
    tracing::info!("Save location set to: {}", config.save_location.display());

    if let Some(submit_url) = &config.submit_url {
        tracing::info!("Submit URL configured ({}), not used by this server", submit_url);
    }

    // --- Ingestion pipeline ---
    let pool = match config.max_concurrent_renders {
        Some(limit) => RenderPool::new(limit),
        None => RenderPool::with_available_parallelism(),
    };
    tracing::info!("Render pool capacity: {}", pool.capacity());

    let mut pipeline = Pipeline::new(
        StorageLayout::new(&config.save_location),
        pool,
        OutputFormat::new(config.output_format, config.jpeg_quality),
    );
    if let Some(limit) = config.max_decoded_images {
        pipeline = pipeline.with_decoded_limit(limit);
    }
    tracing::info!(
        "Decoded images held at once: {}",
        pipeline.decode_slots.capacity()
    );
    let orchestrator = Orchestrator::new(pipeline);

    // --- Identity ---
    let identity = match config.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => Some(Arc::new(IdentityVerifier::new(secret.as_bytes()))),
        _ => {
            tracing::warn!("No JWT secret configured; all uploads go to the shared root");
            None
        }
    };

    let allowed_origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid allowed origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    let settings = WebSettings {
        redirect_url: config.redirect_url,
        read_access: config.read_access,
        report_failures: config.report_failures,
        max_upload_bytes: config.max_upload_bytes,
        multipart_memory_bytes: config.multipart_memory_bytes,
        allowed_origins,
    };
    tracing::info!("Read access policy: {:?}", settings.read_access);

    let app = web::create_app(AppState {
        orchestrator,
        settings: Arc::new(settings),
        identity,
    });
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
    }

    tracing::info!("photo-converter has shut down.");
}
