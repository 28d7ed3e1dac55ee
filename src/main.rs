/*!
 * Helmsman: workload orchestration for small Linux fleets.
 *
 * One binary, two roles. `helmsman manager` runs the central control
 * plane (inventory, scheduling, template catalog, telemetry ingest);
 * `helmsman agent` runs the per-node process that collects telemetry and
 * drives container or native-binary workloads.
 */

use anyhow::{Context, Result};
use clap::{Arg, Command};
use helmsman_core::{AgentConfig, ManagerConfig};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "helmsman=info,helmsman_manager=info,helmsman_agent=info".to_string()),
        )
        .init();

    let matches = Command::new("helmsman")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Distributed workload orchestration for small Linux fleets")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("manager")
                .about("Run the central manager")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("JSON configuration file path"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Listen port (default: 8080)"),
                )
                .arg(
                    Arg::new("db-path")
                        .long("db-path")
                        .value_name("FILE")
                        .help("SQLite database path"),
                ),
        )
        .subcommand(
            Command::new("agent")
                .about("Run the per-node agent")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("JSON configuration file path"),
                )
                .arg(
                    Arg::new("manager-url")
                        .short('m')
                        .long("manager-url")
                        .value_name("URL")
                        .help("Manager base URL (default: http://127.0.0.1:8080)"),
                )
                .arg(
                    Arg::new("hostname")
                        .long("hostname")
                        .value_name("NAME")
                        .help("Reported hostname (probed when unset)"),
                )
                .arg(
                    Arg::new("interface")
                        .short('i')
                        .long("interface")
                        .value_name("IFACE")
                        .help("Interface whose address is advertised"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("SECONDS")
                        .help("Telemetry interval (default: 5)"),
                )
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Listen port (default: 8081)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("manager", sub)) => {
            let mut config = ManagerConfig::load(sub.get_one::<String>("config").map(String::as_str))
                .await
                .context("Failed to load manager configuration")?;
            if let Some(port) = sub.get_one::<String>("port") {
                config.port = port.parse().context("Invalid --port value")?;
            }
            if let Some(db_path) = sub.get_one::<String>("db-path") {
                config.db_path = db_path.clone();
            }

            info!("Starting Helmsman manager on port {}", config.port);
            let manager = helmsman_manager::Manager::new(config).await?;
            manager.serve(shutdown_signal()).await?;
        }

        Some(("agent", sub)) => {
            let mut config = AgentConfig::load(sub.get_one::<String>("config").map(String::as_str))
                .await
                .context("Failed to load agent configuration")?;
            if let Some(url) = sub.get_one::<String>("manager-url") {
                config.manager_url = url.clone();
            }
            if let Some(hostname) = sub.get_one::<String>("hostname") {
                config.hostname = Some(hostname.clone());
            }
            if let Some(interface) = sub.get_one::<String>("interface") {
                config.network_interface = Some(interface.clone());
            }
            if let Some(interval) = sub.get_one::<String>("interval") {
                config.interval = interval.parse().context("Invalid --interval value")?;
            }
            if let Some(port) = sub.get_one::<String>("port") {
                config.port = port.parse().context("Invalid --port value")?;
            }

            info!("Starting Helmsman agent (manager: {})", config.manager_url);
            let agent = helmsman_agent::Agent::new(config)?;
            agent.serve(shutdown_signal()).await?;
        }

        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => { sigterm.recv().await; }
                Err(_) => std::future::pending::<()>().await,
            }
        } => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
