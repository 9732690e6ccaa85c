use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber: console output in `log_format`, plus an
/// append-only copy in `log_file` without ANSI colours. `RUST_LOG` takes
/// precedence over `level`.
///
/// If the log file cannot be opened the console subscriber is still
/// installed and the error is returned for the caller to report.
pub fn init_tracing(level: &str, log_format: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file, file_err) = match log_file.map(open_log_file).transpose() {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        "json" => {
            let file_layer = file.map(|f| fmt::layer().json().with_ansi(false).with_writer(f));
            registry.with(fmt::layer().json()).with(file_layer).init();
        }
        _ => {
            let file_layer = file.map(|f| fmt::layer().with_ansi(false).with_writer(f));
            registry.with(fmt::layer()).with(file_layer).init();
        }
    }

    match file_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn open_log_file(path: &Path) -> std::io::Result<Arc<std::fs::File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}
