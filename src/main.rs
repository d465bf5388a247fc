//! Chanstat Bot - Entry Point
//!
//! Modes:
//! - Default: bot control loop, events as JSON lines on stdin
//! - --report / -r: report server (cached or real-time)

use chanstat_bot::{
    report_server, ChannelBot, Config, LineTransport, RefreshWorker, ReportSource, SnapshotCache,
};
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let report_mode = args.iter().any(|a| a == "--report" || a == "-r");
    let json_logs = args.iter().any(|a| a == "--json-logs");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Chanstat Bot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: chanstat-bot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --report, -r   Run the report server");
        println!("  --json-logs    Log as JSON");
        println!("  --help, -h     Show this help");
        println!();
        println!("Default: run the bot; events are read as JSON lines on stdin,");
        println!("commands are written as JSON lines on stdout.");
        println!();
        println!("Environment variables:");
        println!("  CHANSTAT_DB_PATH           SQLite store (default: data/bdd.sqlite)");
        println!("  CHANSTAT_WHITELIST_PATH    Whitelist file (default: data/whitelist.txt)");
        println!("  CHANSTAT_CHANNEL           Channel to monitor");
        println!("  CHANSTAT_NICK              Bot nick");
        println!("  CHANSTAT_ADMINS            Comma-separated admin nicks");
        println!("  CHANSTAT_ADMIN_HOST        Regex the admin host must match");
        println!("  CHANSTAT_REPORT_ADDR       Report server address (default: 127.0.0.1:8080)");
        println!("  CHANSTAT_REFRESH_SECS      Report refresh delay (default: 30)");
        println!("  CHANSTAT_REALTIME          Recompute the report on each request");
        return Ok(());
    }

    // stdout carries transport commands, so logs always go to stderr
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if report_mode {
        info!("Chanstat report server v{}", env!("CARGO_PKG_VERSION"));

        let source = if config.realtime {
            info!("Real-time mode: report rebuilt on every request");
            ReportSource::Realtime {
                db_path: config.db_path.clone(),
                path_prefix: config.path_prefix.clone(),
            }
        } else {
            let cache = SnapshotCache::new();
            RefreshWorker::new(
                config.db_path.clone(),
                config.path_prefix.clone(),
                config.refresh_delay,
                cache.clone(),
            )
            .spawn(shutdown_rx.clone());
            ReportSource::Cached(cache)
        };

        report_server::serve(config.report_addr, source, &config.path_prefix, shutdown_rx).await?;
    } else {
        info!("Chanstat bot v{} on {}", env!("CARGO_PKG_VERSION"), config.channel);

        let mut bot = ChannelBot::from_config(&config, LineTransport::stdout())?;
        bot.run_lines(BufReader::new(tokio::io::stdin()), shutdown_rx)
            .await?;
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
