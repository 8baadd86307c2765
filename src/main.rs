//! MIDI Router - command-line entry point
//!
//! Listens to MIDI control surfaces and triggers Home Assistant, shell and
//! console actions from declarative mappings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_router::config::{AppConfig, ConfigWatcher};
use midi_router::devices::{self, DeviceManager};
use midi_router::homeassistant::HaClient;
use midi_router::monitor;
use midi_router::router::{Dispatcher, Router, GLOBAL_DEVICE};
use midi_router::ActionRegistry;

/// MIDI Router - route control-surface events to actions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MIDI_ROUTER_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Listen to configured devices and dispatch mapped actions (default)
    Run {
        /// Reload mappings when the config file changes
        #[arg(long)]
        watch: bool,
    },
    /// List available MIDI input ports
    ListDevices,
    /// List registered actions
    ListActions,
    /// Load and validate the configuration
    Check,
    /// Print every message from every MIDI input port
    Monitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    match args.command.unwrap_or(Command::Run { watch: false }) {
        Command::Run { watch } => {
            let code = run(&args.config, watch).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Command::ListDevices => monitor::list_ports_formatted()?,
        Command::ListActions => list_actions(),
        Command::Check => check(&args.config).await?,
        Command::Monitor => monitor::run_monitor().await?,
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn build_registry() -> ActionRegistry {
    ActionRegistry::with_builtins()
}

/// Run the router; returns the process exit code
async fn run(config_path: &PathBuf, watch: bool) -> Result<i32> {
    info!("Starting MIDI Router v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    let config = AppConfig::load(config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let registry = build_registry();
    for action in config.unknown_actions(&registry) {
        warn!("Mappings reference unknown action '{}'", action);
    }

    let ha = match &config.home_assistant {
        Some(ha) if !ha.url.is_empty() => {
            info!("Home Assistant: {}", ha.url);
            Some(HaClient::new(&ha.url, &ha.token)?)
        }
        _ => {
            warn!("Home Assistant not configured, ha_* actions will fail");
            None
        }
    };

    let ports = devices::list_input_ports()?;
    let matched = devices::match_ports(&config.devices, &ports);
    if matched.is_empty() {
        error!("No configured MIDI device found");
        println!("\nAvailable input ports:");
        for (i, port) in ports.iter().enumerate() {
            println!("  [{}] {}", i, port);
        }
        return Ok(1);
    }

    let router = Arc::new(
        Router::new(config.mappings.clone(), registry, ha)
            .with_action_timeout(config.router.action_timeout()),
    );
    info!("Router initialized with {} mappings", config.mapping_count());

    let (tx, dispatcher) = Dispatcher::channel(router.clone(), config.router.queue_size);
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let mut manager = DeviceManager::new();
    if manager.connect_all(&matched, &tx) == 0 {
        error!("Failed to open any MIDI device");
        return Ok(1);
    }
    drop(tx);

    let watcher = if watch {
        Some(ConfigWatcher::new(config_path.clone())?)
    } else {
        None
    };

    info!("Listening... (Ctrl+C to stop)");
    run_app(&router, watcher, shutdown_signal()).await;

    // Closing the ports drops every sender, which ends the dispatcher once
    // the queue is drained
    manager.disconnect_all();
    match dispatcher_task.await {
        Ok(processed) => info!("Processed {} event(s)", processed),
        Err(e) => error!("Dispatcher task failed: {}", e),
    }

    info!("MIDI Router shutdown complete");
    Ok(0)
}

async fn run_app(
    router: &Router,
    mut config_watcher: Option<ConfigWatcher>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = next_config(&mut config_watcher) => match update {
                Some(new_config) => {
                    for action in new_config.unknown_actions(router.registry()) {
                        warn!("Mappings reference unknown action '{}'", action);
                    }
                    router.update_mappings(new_config.mappings);
                }
                None => {
                    warn!("Config watcher stopped, hot reload disabled");
                    config_watcher = None;
                }
            }
        }
    }
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(w) => w.next_config().await,
        None => std::future::pending().await,
    }
}

fn list_actions() {
    let registry = build_registry();

    println!("\n{}", "=== Registered Actions ===".bold().cyan());
    for name in registry.names() {
        if let Some(action) = registry.get(&name) {
            println!("  {:16} {}", name.green(), action.description().dimmed());
        }
    }
    println!();
}

async fn check(config_path: &PathBuf) -> Result<()> {
    let config = AppConfig::load(config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    println!("\n{}", "=== Configuration ===".bold().cyan());
    println!("  File: {}", config_path.display());
    match &config.home_assistant {
        Some(ha) => println!("  Home Assistant: {}", ha.url.green()),
        None => println!("  Home Assistant: {}", "not configured".yellow()),
    }

    println!("\n{}", "Devices:".bold());
    if config.devices.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for device in &config.devices {
        let state = if device.enabled { "enabled".green() } else { "disabled".dimmed() };
        println!("  {} match '{}' ({})", device.name.bright_white(), device.pattern, state);
    }

    println!("\n{}", "Mappings:".bold());
    let mut names: Vec<&String> = config.mappings.keys().collect();
    names.sort_by_key(|name| (name.as_str() == GLOBAL_DEVICE, name.as_str()));
    for name in names {
        println!("  {}:", name.yellow());
        for entry in &config.mappings[name] {
            let cycle = if entry.cycle { " [cycle]".cyan().to_string() } else { String::new() };
            println!(
                "    {} -> {}{}",
                entry.match_rule.signature(),
                entry.action.green(),
                cycle
            );
        }
    }

    let unknown = config.unknown_actions(&build_registry());
    if !unknown.is_empty() {
        println!("\n{}", "Unknown actions:".bold().red());
        for action in unknown {
            println!("  {}", action.red());
        }
    }

    println!(
        "\n{} {} mapping(s) loaded\n",
        "OK".bold().green(),
        config.mapping_count()
    );
    Ok(())
}
