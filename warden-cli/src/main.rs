//! tunwarden CLI
//!
//! Runs one tunnel in the foreground. Signals drive the lifecycle:
//! SIGINT/SIGTERM disconnect, SIGUSR1 pauses and SIGUSR2 resumes.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_dns::DnsController;
use warden_engine::{wgconf, Config, TunnelController, WgQuickBackend};

/// tunwarden - VPN tunnel lifecycle and DNS controller
#[derive(Parser)]
#[command(name = "tunwarden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tunwarden.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the tunnel up and keep it until interrupted
    Connect {
        /// Manual DNS server, overriding the tunnel gateway
        #[arg(long)]
        dns: Option<Ipv4Addr>,
    },

    /// Remove a tunnel interface and configuration left by an earlier run
    Cleanup,

    /// Generate a sample configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "tunwarden.toml")]
        output: PathBuf,
    },
}

/// Control action requested by a signal
enum Action {
    Disconnect,
    Pause,
    Resume,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenConfig { output } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            generate_config(output)
        }
        Commands::Connect { dns } => {
            let config = load_config(&cli.config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(config.log_level.as_str()));
            run_connect(config, dns).await
        }
        Commands::Cleanup => {
            let config = load_config(&cli.config)?;
            init_logging(cli.log_level.as_deref().unwrap_or(config.log_level.as_str()));
            run_cleanup(config).await
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

fn build_controller(config: &Config) -> Result<TunnelController> {
    let dns = DnsController::system(config.dns.helper_path.as_deref())
        .context("Failed to initialize DNS control")?;

    Ok(TunnelController::new(
        Arc::new(WgQuickBackend::new()),
        Arc::new(dns),
        config.backend.interface.clone(),
    )
    .with_poll_interval(config.backend.poll_interval()))
}

async fn run_connect(config: Config, dns: Option<Ipv4Addr>) -> Result<()> {
    info!("Starting tunwarden...");

    let controller = Arc::new(build_controller(&config)?);
    controller.init().await;

    if let Some(dns) = dns.or(config.dns.manual) {
        info!("Using manual DNS {}", dns);
        controller
            .set_manual_dns(dns)
            .await
            .context("Failed to set manual DNS")?;
    }

    let mut signals = Signals::new()?;
    let params = config.connect_params();
    let mut connect = tokio::spawn({
        let controller = controller.clone();
        async move { controller.connect(params).await }
    });

    loop {
        tokio::select! {
            result = &mut connect => {
                return result
                    .context("Connect task failed")?
                    .context("Tunnel failed");
            }
            action = signals.next() => {
                let result = match action {
                    Action::Disconnect => {
                        info!("Disconnecting...");
                        controller.disconnect().await
                    }
                    Action::Pause => controller.pause().await,
                    Action::Resume => controller.resume().await,
                };
                if let Err(e) = result {
                    error!("Control request failed: {}", e);
                }
            }
        }
    }
}

async fn run_cleanup(config: Config) -> Result<()> {
    let controller = build_controller(&config)?;
    controller.init().await;
    wgconf::remove(&config.backend.config_path()).await;

    info!("Cleanup finished");
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    let sample = Config::sample();

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;

    info!("Generated sample configuration at {:?}", output);
    println!("Sample configuration written to {:?}", output);
    println!("\nEdit the configuration file and set your tunnel keys before running.");

    Ok(())
}

/// Signal sources, registered once for the lifetime of the tunnel
struct Signals {
    #[cfg(unix)]
    sigterm: signal::unix::Signal,
    #[cfg(unix)]
    sigint: signal::unix::Signal,
    #[cfg(unix)]
    sigusr1: signal::unix::Signal,
    #[cfg(unix)]
    sigusr2: signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?,
            sigusr1: signal(SignalKind::user_defined1())
                .context("Failed to register SIGUSR1 handler")?,
            sigusr2: signal(SignalKind::user_defined2())
                .context("Failed to register SIGUSR2 handler")?,
        })
    }

    #[cfg(windows)]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn next(&mut self) -> Action {
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM");
                Action::Disconnect
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT");
                Action::Disconnect
            }
            _ = self.sigusr1.recv() => {
                info!("Received SIGUSR1, pausing");
                Action::Pause
            }
            _ = self.sigusr2.recv() => {
                info!("Received SIGUSR2, resuming");
                Action::Resume
            }
        }
    }

    #[cfg(windows)]
    async fn next(&mut self) -> Action {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
        Action::Disconnect
    }
}
