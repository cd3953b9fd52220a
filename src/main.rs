use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use herald::cli::{Cli, Command, run_announce_command, run_render_command, run_scan_once_command};
use herald::config::{Config, LogFormat};
use herald::relay::Relay;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("herald=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let relay = Relay::from_config(&config)?;
    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let ok = match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            relay.run(shutdown).await?;
            true
        }
        Command::Announce { channel, mentions } => {
            run_announce_command(&relay, &channel, &mentions, &shutdown).await?
        }
        Command::Render {
            channel,
            mentions,
            json,
        } => {
            run_render_command(&relay, channel.as_deref(), mentions.as_deref(), json).await?;
            true
        }
        Command::ScanOnce => run_scan_once_command(&relay).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
