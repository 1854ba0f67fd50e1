//! Terminal client: connects to a gantry server, launches one command,
//! and renders the streamed log frames until the server closes.

use anyhow::Context;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use gantry::messages::{ControlFrame, ControlKind, OutputFrame};

/// Launch a command on a gantry server and stream its output.
#[derive(Parser)]
#[command(name = "gantry-client", long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, default_value = "localhost:8080")]
    addr: String,

    /// Command short name (empty resolves to the server's default)
    #[arg(long = "command", default_value = "")]
    command: String,

    /// Arguments to pass to the command
    #[arg(long, default_value = "-ls .")]
    args: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'L', long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Ok(filter) = EnvFilter::try_new(&cli.log_level) else {
        eprintln!("Unknown log level: {}", cli.log_level);
        std::process::exit(1);
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(cli).await {
        error!("fatal: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let url = format!("ws://{}/exec", cli.addr);
    info!(url = %url, "connecting");
    let (socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut tx, mut rx) = socket.split();

    let frame = ControlFrame {
        kind: ControlKind::Command,
        content: cli.command,
        args: shell_words::split(&cli.args).context("unparseable arguments")?,
    };
    debug!(args = ?frame.args, "launching");
    tx.send(Message::Text(serde_json::to_string(&frame)?.into()))
        .await
        .context("failed to send launch frame")?;

    loop {
        tokio::select! {
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<OutputFrame>(&text) {
                    Ok(frame) => render(&frame),
                    Err(err) => error!(error = %err, "failed to read the incoming message"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("closing");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!(error = %err, "failed to read the incoming message");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, closing");
                let _ = tx.send(Message::Close(None)).await;
            }
        }
    }
    Ok(())
}

fn render(frame: &OutputFrame) {
    let line = frame.content.trim_end_matches('\n');
    match frame.prefix.as_deref() {
        Some("stderr") => eprintln!("[stderr] {line}"),
        _ => println!("[stdout] {line}"),
    }
}
