use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use gantry::config::{self, CommandRegistry, CommandSpec};
use gantry::runner::Runner;
use gantry::server;

/// Run, stream, and kill processes over a control socket.
#[derive(Parser)]
#[command(name = "gantry", about = "Remote process runner with live log streaming", long_about = None)]
struct Cli {
    /// Address to serve the control socket on
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Default command to run
    #[arg(short = 'c', long = "command", default_value = "/bin/ls")]
    command: String,

    /// Working directory for the default command
    #[arg(long, default_value = "/")]
    cwd: String,

    /// Arguments for the default background command
    #[arg(long, default_value = "")]
    cargs: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'L', long = "log-level", default_value = "info")]
    log_level: String,

    /// Run the configured background command(s)
    #[arg(short = 'e', long = "exec")]
    exec: bool,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
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
    let raw = config::read_config_file(cli.config.as_deref());
    let mut registry = match &raw {
        Some(bytes) => {
            CommandRegistry::from_config(bytes).context("failed to parse command config")?
        }
        None => CommandRegistry::default(),
    };
    let default_spec = registry.set_default(&cli.command, &cli.cwd);

    if cli.exec {
        let specs = if raw.is_some() && cli.cargs.is_empty() {
            registry.local_commands().to_vec()
        } else {
            let mut spec = default_spec;
            spec.args = cli.cargs.clone();
            vec![spec]
        };
        for spec in specs {
            spawn_background(spec);
        }
    }

    server::serve(&cli.addr, registry).await?;
    Ok(())
}

/// Run one configured command under the supervision loop in its own task.
/// The process exits with the command's final status once the loop halts;
/// Ctrl-C stops the command and exits nonzero.
fn spawn_background(spec: CommandSpec) {
    let mut runner = Runner::new(spec);
    let handle = runner.handle();
    tokio::spawn(async move {
        let status = runner.exec_loop().await;
        debug!(exitcode = status, "background command finished");
        std::process::exit(status);
    });
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
            std::process::exit(1);
        }
    });
}
