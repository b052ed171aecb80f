use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the file-appender worker alive for the process lifetime.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with a compact, colored stdout layer.
///
/// - Default level: INFO (crate at DEBUG), override via RUST_LOG env
/// - Call once at startup; later calls are ignored by the subscriber
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,grim_chat=debug"));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();

    tracing::debug!("Tracing initialized");
}

/// Initialize tracing with an additional daily-rolling file layer under
/// `log_dir`. The non-blocking writer guard is held for the process lifetime.
pub fn init_with_file(log_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,grim_chat=debug"));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let file_appender = tracing_appender::rolling::daily(log_dir, "grim-chat.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    FILE_GUARD.set(guard).ok();

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!("Tracing initialized (file log at {})", log_dir.display());
}
