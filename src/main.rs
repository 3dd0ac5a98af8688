//! Device link service entry point.

use clap::{Parser, Subcommand};
use gblink::command::{ActionExecutor, Command};
use gblink::config::ServiceConfig;
use gblink::observability::init_default_logging;
use gblink::service::DeviceService;
use gblink::transport::mqtt::MqttTransportFactory;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Resilient MQTT connection and command dispatch for constrained devices
#[derive(Parser)]
#[command(name = "gblink")]
#[command(about = "Resilient MQTT connection and command dispatch for constrained devices")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "gblink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device link service
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

/// Built-in executor answering the basic device probes.
struct BuiltinExecutor {
    device_id: String,
}

#[async_trait::async_trait]
impl ActionExecutor for BuiltinExecutor {
    async fn execute(&self, command: &Command) -> Option<Vec<String>> {
        match command.cmd.as_deref() {
            Some("ping") => Some(vec!["pong".to_string()]),
            Some("status") => Some(vec![
                self.device_id.clone(),
                env!("CARGO_PKG_VERSION").to_string(),
            ]),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match ServiceConfig::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, path = %cli.config.display(), "failed to load configuration");
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Config { show } => {
            info!(device_id = %config.device.id, "configuration is valid");
            if show {
                match toml::to_string_pretty(&config) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(error) => {
                        error!(%error, "failed to render configuration");
                        process::exit(1);
                    }
                }
            }
        }
        Commands::Run => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                device_id = %config.device.id,
                broker = %config.mqtt.broker_url,
                "starting device link service"
            );

            let factory = Box::new(MqttTransportFactory::new(config.mqtt.broker_url.clone()));
            let executor = Arc::new(BuiltinExecutor {
                device_id: config.device.id.clone(),
            });
            let service = DeviceService::start(&config, factory, executor).await;

            if let Err(error) = signal::ctrl_c().await {
                error!(%error, "failed to listen for shutdown signal");
            }

            info!("shutdown signal received");
            service.shutdown().await;
        }
    }
}
