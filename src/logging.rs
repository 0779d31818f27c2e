use std::path::Path;

use tracing::Level;
use tracing_subscriber::filter::{filter_fn, EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// Install the global subscriber: a console layer driven by `RUST_LOG` (default `info`) and,
/// when a path is given, a plain-text experiment log.
///
/// Does nothing if a global subscriber is already set, so tests may call it repeatedly.
pub fn install_logger(log_file: Option<&Path>) {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let file = log_file.map(|path| {
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().unwrap_or_else(|| "experiment.log".as_ref());

        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::never(directory, file_name))
            .with_filter(LevelFilter::INFO)
            .with_filter(filter_fn(|metadata| {
                // wgpu is very chatty at info level.
                !matches!(
                    metadata.module_path(),
                    Some(path) if path.starts_with("wgpu") && *metadata.level() >= Level::INFO
                )
            }))
    });

    if registry().with(console).with(file).try_init().is_ok() {
        update_panic_hook(log_file);
    }
}

fn update_panic_hook(log_file: Option<&Path>) {
    let hook = std::panic::take_hook();
    let log_file = log_file.map(|path| path.display().to_string());

    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC => {info}");
        if let Some(log_file) = &log_file {
            eprintln!(
                "=== PANIC ===\nA fatal error happened, you can check the experiment logs here => \
                 '{log_file}'\n============="
            );
        }
        hook(info);
    }));
}
