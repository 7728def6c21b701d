use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use relay_chat::{
    cli::{Cli, Command, ServerArgs},
    client,
    server::BroadcastServer,
};

fn init_tracing(default_filter: &str, to_stderr: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if to_stderr {
        builder.with_writer(std::io::stderr).try_init()
    } else {
        builder.try_init()
    };
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    let result = runtime.block_on(async {
        match cli.command {
            Command::Server(args) => {
                init_tracing("info", false);
                run_server(args).await
            }
            Command::Client(args) => {
                // Keep the chat transcript on stdout free of log lines.
                init_tracing("warn", true);
                client::run(args).await
            }
        }
    });

    // A pending stdin read parks a blocking thread that never returns.
    runtime.shutdown_background();
    result
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let port = args.port();
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("failed to bind relay server to port {port}"))?;
    let server = BroadcastServer::new(listener, args.exclusion);
    let addr = server.local_addr()?;
    info!("relay server listening on {}", addr);
    info!(exclusion = ?args.exclusion, "relay server up and running");

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("relay server exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}
