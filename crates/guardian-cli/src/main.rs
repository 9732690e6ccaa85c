mod config;
mod logging;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::watch;

use guardian_core::{CycleRunner, SocketProber, WebhookNotifier};

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

const EXIT_CONFIG: i32 = 1;
const EXIT_UNREACHABLE: i32 = 2;

/// Port guardian: watch TCP/UDP ports and notify a webhook when they go
/// down or come back.
#[derive(Parser)]
#[command(name = "port-guardian", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every endpoint on a fixed interval until Ctrl+C or SIGTERM.
    Run {
        /// Path to the JSON or TOML config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Probe every endpoint once, print a table and exit.
    Check {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Load and validate the config file without probing anything.
    Validate {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Check { config } => check(&config).await,
        Commands::Validate { config } => validate(&config),
    };
    std::process::exit(code);
}

/// Load the config file. On failure a console subscriber is installed so the
/// error is reported through `tracing`.
fn load_config(path: &Path) -> Option<AppConfig> {
    match AppConfig::load(path) {
        Ok(c) => Some(c),
        Err(e) => {
            let _ = logging::init_tracing("info", "pretty", None);
            tracing::error!("{}", e);
            None
        }
    }
}

fn init_logging(app: &AppConfig, level_override: Option<&str>) {
    let level = level_override
        .or_else(|| app.tracing_directive())
        .unwrap_or("info");

    if let Err(e) = logging::init_tracing(level, &app.log_format, app.log_file.as_deref()) {
        tracing::error!(
            path = ?app.log_file,
            error = %e,
            "Failed to open log file, logging to console only"
        );
    }
    if app.tracing_directive().is_none() {
        tracing::warn!(log_level = %app.log_level, "Unknown log_level, using INFO");
    }
}

async fn run(path: &Path) -> i32 {
    let Some(app) = load_config(path) else {
        return EXIT_CONFIG;
    };
    init_logging(&app, None);
    tracing::info!(path = %path.display(), "Loaded config file");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let notifier = match WebhookNotifier::new(&app.webhook) {
        Ok(n) => n.with_shutdown(shutdown_rx.clone()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up webhook notifier");
            return EXIT_CONFIG;
        }
    };
    tracing::info!(
        url = %app.webhook.url,
        method = %app.webhook.method,
        provider = ?notifier.provider(),
        max_attempts = notifier.max_attempts(),
        "Webhook notifier ready"
    );

    let runner = Arc::new(CycleRunner::new(
        app.to_guardian_config(),
        Arc::new(SocketProber::new()),
        Arc::new(notifier),
    ));
    let endpoints = app.endpoints();
    for ep in &endpoints {
        tracing::info!(endpoint = %ep, "Watching endpoint");
    }

    let scheduler = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run(&endpoints, shutdown_rx).await })
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping scheduler...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), scheduler).await {
        Ok(Ok(())) => tracing::info!("Scheduler shut down"),
        Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
        Err(_) => tracing::warn!("Scheduler did not shut down in time"),
    }

    tracing::info!("Shutdown complete");
    0
}

async fn check(path: &Path) -> i32 {
    let Some(app) = load_config(path) else {
        return EXIT_CONFIG;
    };
    init_logging(&app, Some("warn"));

    let notifier = match WebhookNotifier::new(&app.webhook) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up webhook notifier");
            return EXIT_CONFIG;
        }
    };

    let guardian_config = app.to_guardian_config();
    let timeout_secs = guardian_config.probe_timeout.as_secs();
    let runner = CycleRunner::new(
        guardian_config,
        Arc::new(SocketProber::new()),
        Arc::new(notifier),
    );
    let endpoints = app.endpoints();

    println!(
        "{} {}",
        style("port-guardian").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!(
        "  {} {}  {} {}s\n",
        style("endpoints:").dim(),
        endpoints.len(),
        style("timeout:").dim(),
        timeout_secs
    );

    let (outcomes, summary) = runner.run_cycle_with_summary(&endpoints).await;
    print!("{}", report::render_table(&outcomes));
    println!("\n{}", report::render_summary(&summary));

    if summary.reachable == summary.endpoints {
        0
    } else {
        EXIT_UNREACHABLE
    }
}

fn validate(path: &Path) -> i32 {
    let Some(app) = load_config(path) else {
        return EXIT_CONFIG;
    };

    let notifier = match WebhookNotifier::new(&app.webhook) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("{} {}", style("invalid:").red().bold(), e);
            return EXIT_CONFIG;
        }
    };

    println!(
        "{} {}",
        style("config ok:").green().bold(),
        path.display()
    );
    println!(
        "  {} {}s",
        style("check_interval:").dim(),
        app.check_interval
    );
    println!("  {} {}s", style("timeout:       ").dim(), app.timeout);
    println!("  {} {}", style("endpoints:     ").dim(), app.servers.len());
    println!(
        "  {} {} {} ({:?}, {} attempt(s))",
        style("webhook:       ").dim(),
        app.webhook.method.to_ascii_uppercase(),
        app.webhook.url,
        notifier.provider(),
        notifier.max_attempts()
    );
    if app.tracing_directive().is_none() {
        println!(
            "  {} unknown log_level '{}', INFO will be used",
            style("warning:").yellow(),
            app.log_level
        );
    }
    0
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
