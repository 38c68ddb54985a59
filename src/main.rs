// src/main.rs - Motion host entry point
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;
use text_motion::config::{self, Config};
use text_motion::file_manager::ScriptStore;
use text_motion::hardware::{SerialConnector, SystemSerial};
use text_motion::joystick::Joystick;
use text_motion::motion::ExecutionController;
use text_motion::notices::Notices;
use text_motion::simulator::SimulatedController;
use text_motion::web;
use text_motion::web::motion_channel::MotionRequest;
use tokio::sync::{mpsc, oneshot};

/// Run motion scripts and joystick control against a serial motion controller.
#[derive(Parser, Debug)]
#[command(name = "motion-host", version)]
struct Cli {
    /// Path to a TOML config file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides `server.bind`)
    #[arg(long)]
    bind: Option<String>,

    /// Controller device (overrides `serial.port`)
    #[arg(long)]
    port: Option<String>,

    /// Talk to an in-memory simulated controller instead of a serial device
    #[arg(long)]
    simulate: bool,

    /// Print the serial ports found on this machine and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path).map_err(|e| {
            eprintln!("Failed to load config from '{}': {}", path, e);
            Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    config.validate()?;

    // Initialize logging
    let level = tracing::Level::from_str(&config.logging.level).unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting motion host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let connector: Arc<dyn SerialConnector> = if cli.simulate {
        tracing::warn!("Using simulated controller; no serial device will be opened");
        Arc::new(SimulatedController::new().with_reply_delay(std::time::Duration::from_millis(500)))
    } else {
        Arc::new(SystemSerial)
    };

    if cli.list_ports {
        for port in connector.available_ports() {
            println!("{}", port);
        }
        return Ok(());
    }

    tracing::info!("Controller: {} @ {} baud", config.serial.port, config.serial.baud);
    tracing::info!("Completion timeout: {:?}", config.motion.ack_timeout());

    let scripts = ScriptStore::new(&config.scripts.directory);
    scripts.ensure_directory().await?;
    tracing::info!("Scripts directory: {}", scripts.directory().display());

    let notices = Notices::new();
    let joystick = if config.joystick.enabled {
        let joystick = Joystick::new(&config, connector.clone());
        joystick.spawn();
        tracing::info!("Joystick control enabled on {}", config.joystick_port());
        Some(joystick)
    } else {
        None
    };

    // Set up a channel for communication between Axum handlers and the controller task.
    let (motion_tx, motion_rx) = mpsc::channel::<MotionRequest>(16);
    let controller = ExecutionController::new(&config, connector, scripts.clone(), notices.clone());
    let controller_task = tokio::spawn(controller.serve(motion_rx));

    let state = Arc::new(web::api::AppStateInner {
        motion_tx: motion_tx.clone(),
        scripts,
        notices,
        joystick,
    });
    let app = web::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Make sure the controller is told to stop before exiting.
    let (resp_tx, resp_rx) = oneshot::channel();
    if motion_tx.send(MotionRequest::Stop { respond_to: resp_tx }).await.is_ok() {
        if let Ok(report) = resp_rx.await {
            tracing::info!("Shutdown stop: {:?}", report);
        }
    }
    drop(motion_tx);
    let _ = controller_task.await;

    tracing::info!("Motion host stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
