use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use control_point::logging::{init_logging, LoggingMode};
use control_point::{
    start_event_server, ControlPoint, ControlPointConfig, JsonFileStore, KeyValueStore, MemoryStore,
};
use soap_client::SoapClient;
use upnp_discovery::{discover_once, Discovery, DiscoveryConfig};

mod console;
mod render;

use console::{parse_line, Console, HELP};

/// UPnP AV / OpenHome control point
///
/// Browses media servers on the local network and plays their content on
/// OpenHome renderers.
#[derive(Parser, Debug)]
#[command(name = "avcp")]
#[command(version)]
struct Cli {
    /// Log mode (silent, development, debug)
    #[arg(long, default_value = "development", env = "AVCP_LOG_MODE")]
    log_mode: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the devices that answer within a search window
    Discover {
        /// Length of the search window in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },
    /// Run the control point with an interactive prompt
    Watch {
        /// Port for incoming event notifications
        #[arg(long)]
        event_port: Option<u16>,

        /// State file (default: the user config directory)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = LoggingMode::from_name(&cli.log_mode)
        .with_context(|| format!("unknown log mode '{}'", cli.log_mode))?;
    init_logging(mode)?;

    match cli.command {
        Command::Discover { seconds } => discover(Duration::from_secs(seconds)).await,
        Command::Watch {
            event_port,
            state_file,
        } => watch(event_port, state_file).await,
    }
}

async fn discover(window: Duration) -> Result<()> {
    let client = SoapClient::new()?;
    let devices = discover_once(DiscoveryConfig::default(), client, window).await?;
    if devices.is_empty() {
        println!("No devices found");
    }
    for device in devices {
        let mut roles = Vec::new();
        if device.is_media_server() {
            roles.push("media server");
        }
        if device.is_openhome_renderer() {
            roles.push("renderer");
        }
        let roles = if roles.is_empty() {
            "unsupported".to_string()
        } else {
            roles.join(", ")
        };
        println!("{}  [{roles}]  {} {}  ({})", device.name, device.manufacturer, device.model_name, device.uuid);
    }
    Ok(())
}

fn open_store(path: Option<PathBuf>) -> Arc<dyn KeyValueStore> {
    let opened = match path {
        Some(path) => JsonFileStore::open(path),
        None => JsonFileStore::open_default(),
    };
    match opened {
        Ok(store) => {
            info!(path = %store.path().display(), "Using state file");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "No state file, selections will not be remembered");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn watch(event_port: Option<u16>, state_file: Option<PathBuf>) -> Result<()> {
    let mut config = ControlPointConfig::default();
    if let Some(port) = event_port {
        config = config.with_event_port(port);
    }
    let store = open_store(state_file);
    let client = SoapClient::new()?;

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let server = start_event_server(&config, store.as_ref(), notify_tx)
        .await
        .context("failed to start the event server")?;
    let (discovery, discovery_rx) =
        Discovery::start(DiscoveryConfig::default(), client.clone()).context("failed to start discovery")?;

    let (mut control_point, handle, mut events) = ControlPoint::new(config, client, store, server.base_url());
    control_point.attach_discovery(discovery.handle());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = render::describe(&event) {
                println!("{line}");
            }
        }
    });
    let running = tokio::spawn(control_point.run(discovery_rx, notify_rx));

    println!("{HELP}");
    let mut console = Console::new(handle.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(line)) => match console.execute(line).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("error: {e}"),
                    },
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown()?;
    running.await??;
    printer.abort();
    tokio::task::spawn_blocking(move || discovery.shutdown()).await?;
    server.shutdown().await;
    Ok(())
}
