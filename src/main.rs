use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::admission::{Admission, AdmissionService, RequestParts};
use turnstile::config::TurnstileConfig;
use turnstile::ratelimit::{RateLimiter, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "Per-key request admission engine")]
struct Cli {
    /// YAML configuration file; TURNSTILE_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate the configuration, then print it
    Validate,
    /// Replay synthetic requests for one caller and print each admission
    Simulate {
        /// How the caller is identified
        #[arg(long, value_enum, default_value_t = SimulateMode::Ip)]
        mode: SimulateMode,

        /// Token or address of the caller
        #[arg(long, default_value = "127.0.0.1")]
        key: String,

        /// Number of requests to send
        #[arg(long, default_value_t = 20)]
        requests: u32,

        /// Delay between requests; 0 sends them all concurrently
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SimulateMode {
    Token,
    Ip,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TurnstileConfig::load(cli.config.as_deref())?;
    info!(
        token_enabled = config.limiter.token.enabled,
        ip_enabled = config.limiter.ip.enabled,
        token_header = %config.admission.token_header,
        "Configuration loaded"
    );

    match cli.command {
        Command::Validate => {
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Simulate {
            mode,
            key,
            requests,
            interval_ms,
        } => {
            let limiter = Arc::new(RateLimiter::start(&config.limiter, Arc::new(SystemClock))?);
            let service = AdmissionService::new(limiter.clone(), &config);

            tokio::select! {
                _ = simulate(&service, mode, &key, requests, interval_ms) => {}
                _ = shutdown_signal() => {}
            }

            limiter.shutdown().await;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn simulate(
    service: &AdmissionService<RateLimiter>,
    mode: SimulateMode,
    key: &str,
    requests: u32,
    interval_ms: u64,
) {
    let request = match mode {
        SimulateMode::Token => RequestParts {
            token: Some(key),
            peer_addr: "127.0.0.1",
            ..Default::default()
        },
        SimulateMode::Ip => RequestParts {
            peer_addr: key,
            ..Default::default()
        },
    };

    info!(requests = requests, interval_ms = interval_ms, "Starting simulation");

    if interval_ms == 0 {
        let outcomes = join_all((0..requests).map(|_| service.evaluate(&request))).await;
        for (seq, admission) in outcomes.iter().enumerate() {
            report(seq as u32, admission);
        }
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    for seq in 0..requests {
        ticker.tick().await;
        let admission = service.evaluate(&request).await;
        report(seq, &admission);
    }
}

fn report(seq: u32, admission: &Admission) {
    let line = match admission {
        Admission::Pass(decision) => serde_json::json!({
            "seq": seq,
            "allowed": true,
            "remaining": decision.map(|d| d.remaining),
        }),
        Admission::Reject {
            retry_after_secs,
            decision,
        } => serde_json::json!({
            "seq": seq,
            "allowed": false,
            "status": admission.status(),
            "retry_after_secs": retry_after_secs,
            "retry_after_ms": decision.retry_after.as_millis() as u64,
        }),
        Admission::Fail => serde_json::json!({
            "seq": seq,
            "allowed": false,
            "status": admission.status(),
        }),
    };
    println!("{}", line);
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
