//! SDKWork-Presenter CLI
//!
//! Runs the presentation generation server and inspects its speech engines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sdkwork_presenter::server::{PresenterServer, ServerConfig};
use sdkwork_presenter::speech::SpeechGateway;
use sdkwork_presenter::VERSION;

/// SDKWork-Presenter - project presentations with narrated slides
#[derive(Parser, Debug)]
#[command(name = "sdkwork-presenter")]
#[command(author, version, about, long_about = None)]
#[command(long_about = "
SDKWork-Presenter turns project data into narrated slide decks, streamed
slide by slide over WebSocket while generation is still running.

Examples:
  # Start the server with defaults
  sdkwork-presenter serve

  # Start with a config file on another port
  sdkwork-presenter serve --config presenter.yaml --port 8080

  # Check which speech engines are reachable
  sdkwork-presenter engines --detailed
")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List configured speech engines
    Engines {
        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Probe each engine and show its voices
        #[arg(short, long)]
        detailed: bool,
    },

    /// Write the default configuration
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "presenter.yaml")]
        output: PathBuf,
    },
}

fn setup_logging(verbose: bool, level: &str) -> Result<()> {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .context("Invalid log filter")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

async fn shutdown_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!("failed to listen for ctrl-c: {}", e),
    }
    token.cancel();
}

async fn print_engines(config: &ServerConfig, detailed: bool) -> Result<()> {
    let gateway = SpeechGateway::from_config(&config.speech).context("Failed to build speech engines")?;

    println!("\nSpeech engines (priority order)\n");
    println!("{:<4} {:<12} {:<10} {:<8} {:<28} {}", "#", "NAME", "TYPE", "HEALTH", "URL", "LANGUAGES");

    let health = if detailed {
        gateway.engine_health().await
    } else {
        Vec::new()
    };
    for (i, engine) in gateway.engines().iter().enumerate() {
        let d = engine.descriptor();
        let status = match health.get(i) {
            Some(h) if h.healthy => "up",
            Some(_) => "down",
            None => "-",
        };
        println!(
            "{:<4} {:<12} {:<10} {:<8} {:<28} {}",
            d.priority,
            d.name,
            d.kind,
            status,
            d.base_url,
            d.languages.join(",")
        );
        if detailed {
            for voice in engine.voices() {
                println!("       voice {:<24} {} ({})", voice.id, voice.language, voice.gender);
            }
        }
    }

    println!("\nTotal: {} engine(s), cache key version {}", gateway.engines().len(), gateway.engine_set_version());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            setup_logging(cli.verbose, &config.logging.level)?;
            info!("SDKWork-Presenter v{}", VERSION);

            let server = PresenterServer::new(config).context("Failed to initialize server")?;
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));
            server.run(shutdown).await.context("Server error")?;
            Ok(())
        }

        Commands::Engines { config, detailed } => {
            let config = load_config(config.as_deref())?;
            setup_logging(cli.verbose, "warn")?;
            print_engines(&config, detailed).await
        }

        Commands::InitConfig { output } => {
            setup_logging(cli.verbose, "info")?;
            if output.exists() {
                anyhow::bail!("{} already exists", output.display());
            }
            ServerConfig::default()
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("wrote default config to {}", output.display());
            Ok(())
        }
    }
}
