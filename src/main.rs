// Svcdeck - Cross-platform service control CLI
// Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use svcdeck::config::Config;
use svcdeck::health::HealthCheckManager;
use svcdeck::manager::ServiceManager;
use svcdeck::provider::{
    ControlAction, ListFilters, PlatformProvider, ServiceStatus, SystemRunner,
};
use svcdeck::version::build_info;

#[derive(Parser, Debug)]
#[command(name = "svcdeck")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Show version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Show detailed build information
    #[arg(long)]
    build_info: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List services known to the platform service manager
    List {
        /// Case-insensitive substring match on name, description or path
        #[arg(short, long)]
        search: Option<String>,

        /// Only show services with this status (active, inactive, failed, ...)
        #[arg(long)]
        status: Option<ServiceStatus>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show detailed information for one service
    Details {
        service: String,

        #[arg(long)]
        json: bool,
    },

    /// Start a service
    Start { service: String },

    /// Stop a service
    Stop { service: String },

    /// Restart a service
    Restart { service: String },

    /// Enable a service at boot/login
    Enable { service: String },

    /// Disable a service at boot/login
    Disable { service: String },

    /// Monitor service health, printing transition events until interrupted
    Monitor {
        /// Services to monitor
        #[arg(required = true)]
        services: Vec<String>,

        /// Sampling interval in milliseconds (minimum 5000)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Consecutive failures before a service is unhealthy
        #[arg(long)]
        threshold: Option<u32>,

        /// Restart a service once when it turns unhealthy
        #[arg(long)]
        auto_restart: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version flag
    if cli.version {
        println!("{}", build_info().format_detailed());
        return Ok(());
    }

    // Handle build info flag
    if cli.build_info {
        println!("{}", build_info().format_display());
        println!("\n{}", build_info().format_build_info());
        return Ok(());
    }

    // Diagnostics go to stderr so stdout stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(cli.config.map(std::path::PathBuf::from))?;
    let provider = PlatformProvider::detect(Arc::new(SystemRunner))?;
    let manager = Arc::new(ServiceManager::new(provider, config.clone()));

    match cli.command.unwrap_or(Command::List {
        search: None,
        status: None,
        json: false,
    }) {
        Command::List {
            search,
            status,
            json,
        } => {
            let filters = ListFilters { search, status };
            let records = manager.list_services(&filters).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_service_table(&records);
            }
        }
        Command::Details { service, json } => match manager.get_service_details(&service).await? {
            Some(record) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                } else {
                    print_service_details(&record);
                }
            }
            None => {
                eprintln!("service '{}' not found", service);
                std::process::exit(1);
            }
        },
        Command::Start { service } => control(&manager, &service, ControlAction::Start).await?,
        Command::Stop { service } => control(&manager, &service, ControlAction::Stop).await?,
        Command::Restart { service } => control(&manager, &service, ControlAction::Restart).await?,
        Command::Enable { service } => control(&manager, &service, ControlAction::Enable).await?,
        Command::Disable { service } => control(&manager, &service, ControlAction::Disable).await?,
        Command::Monitor {
            services,
            interval_ms,
            threshold,
            auto_restart,
        } => {
            let mut health_config = config.health.clone();
            if let Some(interval_ms) = interval_ms {
                health_config.interval_ms = interval_ms;
            }
            if let Some(threshold) = threshold {
                health_config.failure_threshold = threshold;
            }
            health_config.auto_restart = auto_restart;
            health_config.enabled = true;
            health_config.validate()?;

            run_monitor(manager, health_config, services).await?;
        }
    }

    Ok(())
}

async fn control(
    manager: &ServiceManager,
    service: &str,
    action: ControlAction,
) -> Result<()> {
    let result = manager.control_service(service, action).await?;
    if result.elevated {
        println!("{} {}: ok (elevated)", action, result.service_id);
    } else {
        println!("{} {}: ok", action, result.service_id);
    }
    Ok(())
}

async fn run_monitor(
    manager: Arc<ServiceManager>,
    health_config: svcdeck::config::HealthConfig,
    services: Vec<String>,
) -> Result<()> {
    let health = HealthCheckManager::new(manager, health_config);
    let mut events = health.subscribe();
    for service in &services {
        health.start_monitoring(service, service, None);
    }
    println!(
        "monitoring {} service(s), Ctrl-C to stop",
        services.len()
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => println!(
                        "{} {} {} -> {}{}",
                        event.timestamp.format("%H:%M:%S"),
                        event.service_id,
                        event.previous_status,
                        event.status,
                        event
                            .message
                            .as_deref()
                            .map(|m| format!(" ({})", m))
                            .unwrap_or_default(),
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("dropped {} health events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                health.shutdown();
                break;
            }
        }
    }
    Ok(())
}

fn print_service_table(records: &[svcdeck::provider::ServiceRecord]) {
    println!(
        "{:<40} {:<20} {:<10} DESCRIPTION",
        "NAME", "STATUS", "STARTUP"
    );
    for record in records {
        println!(
            "{:<40} {:<20} {:<10} {}",
            record.name, record.status_label, record.startup_type, record.description
        );
    }
    println!("{} service(s)", records.len());
}

fn print_service_details(record: &svcdeck::provider::ServiceRecord) {
    println!("Id:          {}", record.id);
    println!("Name:        {}", record.name);
    println!("Description: {}", record.description);
    println!("Status:      {}", record.status_label);
    println!("Startup:     {}", record.startup_type);
    println!("Provider:    {}", record.provider);
    if let Some(executable) = &record.executable {
        println!("Executable:  {}", executable);
    }
    if let Some(locator) = &record.locator {
        println!("Locator:     {}", locator);
    }
    if let Some(pid) = record.pid {
        println!("PID:         {}", pid);
    }
}
