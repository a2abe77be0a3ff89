//! Gateway Service (`gwsrv`)
//!
//! Relays IEC 60870-5-104 points and commands to downstream Modbus TCP devices.

use clap::Parser;
use tracing::{error, info};

use common::service_bootstrap::{self, ServiceInfo};
use errors::{VoltageErrorTrait, VoltageResult};
use gwsrv::config::{GatewayConfig, DEFAULT_CONFIG_PATH};
use gwsrv::core::{ClientRegistry, EventSink, Gateway, PointTable, Scheduler, UpstreamHandle};
use gwsrv::protocols::modbus;

/// Capacity of the upstream request queue
const REQUEST_QUEUE: usize = 64;

/// Command-line arguments for gwsrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "gwsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "IEC 60870-5-104 Gateway Service",
    long_about = None
)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long, env = "GWSRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    validate: bool,
}

const BANNER: &str = r#"
  ██████╗ ██╗    ██╗███████╗██████╗ ██╗   ██╗
 ██╔════╝ ██║    ██║██╔════╝██╔══██╗██║   ██║
 ██║  ███╗██║ █╗ ██║███████╗██████╔╝██║   ██║
 ██║   ██║██║███╗██║╚════██║██╔══██╗╚██╗ ██╔╝
 ╚██████╔╝╚███╔███╔╝███████║██║  ██║ ╚████╔╝
  ╚═════╝  ╚══╝╚══╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
"#;

#[tokio::main]
async fn main() -> VoltageResult<()> {
    let args = Args::parse();

    let service_info = ServiceInfo::new(
        "gwsrv",
        env!("CARGO_PKG_VERSION"),
        "IEC 60870-5-104 Gateway - Modbus TCP downstream",
    )
    .with_banner(BANNER);

    // Config decides the log directory, so load it before logging is up
    let config = GatewayConfig::load(&args.config);
    let (log_dir, json_logs) = match &config {
        Ok(c) => (c.service.log_dir.clone(), c.service.json_logs),
        Err(_) => (None, false),
    };
    service_bootstrap::init_logging(
        &service_info,
        log_dir.as_deref(),
        &args.log_level,
        !args.no_color,
        json_logs,
    )?;
    service_bootstrap::print_startup_banner(&service_info);

    let result = match config {
        Ok(config) => {
            info!("Configuration loaded from {}", args.config);
            run(&args, config).await
        },
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!("gwsrv failed [{}] ({:?}): {}", e.error_code(), e.category(), e);
    }
    result
}

async fn run(args: &Args, config: GatewayConfig) -> VoltageResult<()> {
    let directory = config.validate()?;
    if args.validate {
        info!("Validation completed successfully: {} datapoints", directory.len());
        return Ok(());
    }

    let (events, event_rx) = EventSink::channel();
    let mut registry = ClientRegistry::new(events);
    registry.register_scheme(modbus::SCHEME, modbus::factory(&config.modbus));

    let mut gateway = Gateway::start(directory, registry, event_rx, PointTable::new()).await;

    // The upstream server holds this handle; keeping it here keeps the queue open
    let (_upstream, requests) = UpstreamHandle::channel(REQUEST_QUEUE);

    let scheduler = Scheduler::new(config.scheduler.interval(), config.scheduler.poll_timeout());
    let shutdown = common::shutdown::shutdown_token();
    scheduler.run(&mut gateway, requests, shutdown).await;

    info!("gwsrv stopped");
    Ok(())
}
