mod event;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use wikid_engine::router::router;
use wikid_engine::server::{Server, ServerCmd, ServerConfig, ServerEvent};
use wikid_engine::state::AppState;

use crate::event::spawn_event_logger;
use crate::ui::print_banner;

/// wikid: a minimal page-editing web server.
///
/// Serves `/view/<title>`, `/edit/<title>` and `/save/<title>`, keeping each
/// page as `<title>.txt` in the data directory.
#[derive(Parser, Debug)]
#[command(name = "wikid", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Directory where page files are stored.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Directory containing `view.html` and `edit.html`. Built-in
    /// templates are used when omitted.
    #[arg(short, long)]
    templates: Option<PathBuf>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            data_dir: args.data_dir,
            templates_dir: args.templates,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikid=info,warn")),
        )
        .init();

    if let Err(e) = run(ServerConfig::from(args)).await {
        eprintln!("wikid: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    let state = AppState::from_config(&config).await?;
    let handle = Server.start(router(state));
    let mut events_rx = handle.events_tx.subscribe();

    handle
        .cmd_tx
        .send(ServerCmd::StartListening {
            addr: config.listen.clone(),
        })
        .await
        .context("server loop is not running")?;

    let addr = wait_until_listening(&mut events_rx).await?;
    print_banner(&addr, &config);
    spawn_event_logger(events_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    handle.shut_down().await
}

/// Waits for the bind outcome of the `StartListening` command.
async fn wait_until_listening(
    events_rx: &mut broadcast::Receiver<ServerEvent>,
) -> anyhow::Result<String> {
    loop {
        match events_rx.recv().await {
            Ok(ServerEvent::Listening { addr }) => return Ok(addr),
            Ok(ServerEvent::Error { message }) => bail!("{message}"),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => bail!("server stopped before listening"),
        }
    }
}
