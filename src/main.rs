use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voxlink::config::EndpointConfig;
use voxlink::kernel::event::Command;
use voxlink::kernel::ledger::Speaker;
use voxlink::kernel::status::SessionStatus;
use voxlink::services::transport::discovery::{discover_endpoint, discovery_client};
use voxlink::services::transport::websocket::WebSocketTransport;
use voxlink::{ControllerConfig, SessionController, SessionSnapshot};

#[derive(Parser, Debug)]
#[command(name = "voxlink", version, about = "Operator console for a voice session with a remote agent")]
struct Cli {
    /// WebSocket endpoint. Falls back to $VOXLINK_WS_URL, then ws://localhost:7860/ws.
    #[arg(long)]
    url: Option<String>,

    /// HTTP base of the agent server; the endpoint is fetched with POST /connect.
    #[arg(long, conflicts_with = "url")]
    discover: Option<String>,

    /// Connect right away instead of waiting for the `connect` command.
    #[arg(long)]
    connect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let endpoint = match cli.discover.as_deref() {
        Some(base) => discover_endpoint(&discovery_client(), base).await?,
        None => EndpointConfig::resolve(cli.url.as_deref()).context("resolving endpoint")?,
    };
    info!(%endpoint, "Voxlink starting");

    let config = ControllerConfig {
        endpoint,
        ..ControllerConfig::default()
    };
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(16);

    let controller = SessionController::new(config, WebSocketTransport::new, events_tx);
    let snapshots = controller.subscribe();
    let latest = snapshots.clone();

    let shutdown = CancellationToken::new();
    let session = tokio::spawn(controller.run(command_rx, events_rx, shutdown.clone()));
    let printer = tokio::spawn(print_changes(snapshots));

    if cli.connect && command_tx.send(Command::Connect).await.is_err() {
        warn!("session loop is gone");
    }

    println!("Commands: connect, disconnect, status, metrics, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let command = match line.trim() {
                    "" => continue,
                    "connect" => Command::Connect,
                    "disconnect" => Command::Disconnect,
                    "status" => {
                        print_status(&latest.borrow());
                        continue;
                    }
                    "metrics" => {
                        let timeline = serde_json::to_string_pretty(&latest.borrow().timeline)
                            .context("encoding timeline")?;
                        println!("{timeline}");
                        continue;
                    }
                    "quit" | "exit" => break,
                    other => {
                        println!("unknown command '{other}'");
                        continue;
                    }
                };
                if command_tx.send(command).await.is_err() {
                    warn!("session loop is gone");
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    session.await.context("session task failed")?;
    printer.abort();
    info!("Voxlink stopped");
    Ok(())
}

async fn print_changes(mut snapshots: watch::Receiver<SessionSnapshot>) {
    let mut last_status: Option<SessionStatus> = None;
    let mut seen_turns = 0usize;

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();

        if last_status != Some(snapshot.status) {
            println!("[status] {}", snapshot.status);
            last_status = Some(snapshot.status);
        }
        // Turns are cleared on every terminal transition.
        if snapshot.turns.len() < seen_turns {
            seen_turns = 0;
        }
        for turn in &snapshot.turns[seen_turns..] {
            let who = match turn.speaker {
                Speaker::User => "you",
                Speaker::Agent => "agent",
            };
            println!("[{who}] {}", turn.text);
        }
        seen_turns = snapshot.turns.len();
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    println!(
        "status: {}  listening: {}  turns: {}",
        snapshot.status,
        snapshot.listening,
        snapshot.turns.len()
    );
    for entry in &snapshot.logs {
        println!("  {}", entry.line());
    }
}
