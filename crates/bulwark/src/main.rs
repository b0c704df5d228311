//! Bulwark server entry point.
//!
//! Loads `bulwark.toml`, starts the internal services and extensions, then
//! serves the operator console until EOF or a termination signal.

mod cli;
mod config;
mod console;
mod logging;
mod signals;

use anyhow::{anyhow, Result};
use cli::CliArgs;
use config::AppConfig;
use extension_host::{
    CommandManager, GroupManager, HostServices, JsonFileStore, LibraryLoader, Orchestrator,
    OrchestratorConfig,
};
use std::sync::Arc;
use tracing::{error, info};

struct Application {
    config: AppConfig,
    host: Orchestrator,
}

impl Application {
    async fn new(args: CliArgs) -> Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(extension_dir) = args.extension_dir {
            config.host.extension_directory = extension_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;
        logging::setup_logging(&config.logging)?;

        let store = Arc::new(JsonFileStore::new(config.data_directory()));
        let loader = LibraryLoader::new(config.extension_directory(), config.library_directory());
        let mut host = Orchestrator::new(
            HostServices::new(store),
            Box::new(loader),
            OrchestratorConfig {
                services_continue_on_error: config.host.services_continue_on_error,
            },
        );
        host.register_service(GroupManager::new())?;
        host.register_service(CommandManager::new())?;

        info!(
            "Bulwark v{} | config: {} | data: {} | extensions: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display(),
            config.host.data_directory,
            config.host.extension_directory
        );
        Ok(Self { config, host })
    }

    async fn run(mut self) -> Result<()> {
        if let Err(e) = self.host.start().await {
            error!("Startup failed: {}", e);
            self.host.shutdown().await?;
            return Err(e.into());
        }

        let registry = self.host.services().commands.clone();
        info!(
            "Ready in {:?} mode with {} command(s). Type commands below, Ctrl+C to stop",
            self.config.host.server_state,
            registry.commands().len()
        );

        let input = console::spawn_stdin_reader();
        tokio::select! {
            result = console::run_console(registry, self.config.host.server_state, input, tokio::io::stdout()) => {
                match result {
                    Ok(count) => info!("Console closed after {} command(s)", count),
                    Err(e) => error!("Console failed: {}", e),
                }
            }
            result = signals::wait_for_shutdown_signal() => {
                if let Err(e) = result {
                    error!("Signal handling failed: {}", e);
                }
            }
        }

        info!("Shutting down");
        self.host.shutdown().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let app = Application::new(args).await?;
    app.run().await
}
