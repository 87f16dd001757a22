//! containerd-charm - Registry-aware containerd configuration
//!
//! Command line entry point invoked from the charm's hooks.

use anyhow::Context;
use clap::{Parser, Subcommand};
use containerd_charm::charm::persist::write_atomic;
use containerd_charm::charm::{
    sandbox_image, ProxySettings, Reconciler, RuntimeEndpoint, UnitState,
};
use containerd_charm::config::CharmConfig;
use containerd_charm::host::{self, Systemctl};
use containerd_charm::render::renderer::CONFIG_DIRECTORY;
use containerd_charm::render::GpuDriver;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STATE_PATH: &str = "/var/lib/containerd-charm/state.json";

/// containerd charm
#[derive(Parser)]
#[command(name = "containerd-charm")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Registry-aware containerd configuration for Juju units", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Charm options (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Unit state (JSON)
    #[arg(short, long, global = true, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render config.toml without touching the host
    Render {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory the TLS file paths point into
        #[arg(long, default_value = CONFIG_DIRECTORY)]
        config_dir: PathBuf,
    },

    /// Validate charm options
    Validate,

    /// Render, persist and restart containerd
    Apply {
        /// containerd configuration directory
        #[arg(long, default_value = CONFIG_DIRECTORY)]
        config_dir: PathBuf,
        /// Timeout for host commands in seconds
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Print the sandbox image that would be used
    SandboxImage,

    /// Print relation data for the principal charm as JSON
    Publish,

    /// Print the installed containerd version
    Version {
        /// Timeout in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CharmConfig> {
    match path {
        Some(path) => CharmConfig::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display())),
        None => Ok(CharmConfig::default()),
    }
}

fn load_state(path: &Path) -> anyhow::Result<UnitState> {
    UnitState::load(path).with_context(|| format!("Failed to load state from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render { output, config_dir } => {
            let state = load_state(&cli.state)?;
            let reconciler = Reconciler::new(Systemctl::default()).with_config_dir(config_dir);
            let rendered = reconciler.render(&config, &state)?;
            match output {
                Some(path) => {
                    write_atomic(&path, rendered.as_str().as_bytes())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Rendered {} config to {}", rendered.schema(), path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Commands::Validate => {
            config.validate()?;
            println!("Options are valid");
        }

        Commands::Apply {
            config_dir,
            timeout,
        } => {
            let timeout = Duration::from_secs(timeout);
            let mut state = load_state(&cli.state)?;

            if state.gpu_present.is_none() && config.gpu_driver()? == GpuDriver::Auto {
                match host::probe_nvidia(timeout).await {
                    Ok(present) => state.gpu_present = Some(present),
                    Err(e) => warn!("GPU probe failed, assuming no NVIDIA hardware: {}", e),
                }
            }

            let reconciler = Reconciler::new(Systemctl::new(timeout))
                .with_config_dir(config_dir)
                .with_juju_proxy(ProxySettings::from_env());
            let result = reconciler.reconcile(&config, &mut state).await;

            // persist what was applied even when a later step failed
            state
                .save(&cli.state)
                .with_context(|| format!("Failed to save state to {}", cli.state.display()))?;

            match result {
                Ok(outcome) => {
                    info!(
                        "Reconciled: config written {}, proxy changed {}, restarted {}",
                        outcome.config_written, outcome.proxy_changed, outcome.restarted
                    );
                    println!("{}", outcome.digest);
                }
                Err(e) => {
                    error!("Reconciliation failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        Commands::SandboxImage => {
            let state = load_state(&cli.state)?;
            println!(
                "{}",
                sandbox_image(
                    state.principal.sandbox_image.as_deref(),
                    state.docker_registry.as_ref(),
                    &state.related_applications,
                )
            );
        }

        Commands::Publish => {
            let state = load_state(&cli.state)?;
            let endpoint = RuntimeEndpoint::from_state(&config, &state)?;
            println!("{}", serde_json::to_string_pretty(&endpoint)?);
        }

        Commands::Version { timeout } => {
            match host::containerd_version(Duration::from_secs(timeout)).await? {
                Some(version) => println!("{}", version),
                None => anyhow::bail!("Could not determine containerd version"),
            }
        }
    }

    Ok(())
}
