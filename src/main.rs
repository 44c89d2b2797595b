mod dispatch;
mod relay;
mod server;

#[cfg(test)]
mod testutil;

use bridge24_core::config::{self, AppConfig};
use bridge24_core::traits::WhatsAppGateway;
use bridge24_gateways::{bitrix::BitrixClient, whatsapp::WhatsAppClient};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "bridge24",
    version,
    about = "WhatsApp Business ↔ Bitrix24 Open Channel relay"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server.
    Serve,
    /// Run one Bitrix24 → WhatsApp relay cycle and exit.
    Poll,
    /// Check connectivity to both platforms.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    // Keep the guard alive so buffered file logs flush on exit.
    let _log_guard = init_tracing(&cfg.app);

    let whatsapp = Arc::new(WhatsAppClient::new(cfg.whatsapp.clone()));
    let bitrix = Arc::new(BitrixClient::new(cfg.bitrix24.clone()));

    match cli.command {
        Commands::Serve => {
            cfg.validate()?;
            server::serve(cfg, whatsapp, bitrix).await?;
        }
        Commands::Poll => {
            cfg.validate()?;
            let coordinator =
                relay::RelayCoordinator::new(whatsapp, bitrix, cfg.relay.message_limit);
            let relayed = coordinator.run_cycle().await?;
            println!("Messages relayed: {relayed}");
        }
        Commands::Status => {
            println!("bridge24 — status check\n");
            println!("Config: {}", cli.config);
            println!();

            match whatsapp.phone_number_info().await {
                Ok(info) => {
                    let display = info
                        .get("display_phone_number")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown number");
                    println!("  whatsapp: connected ({display})");
                }
                Err(e) => println!("  whatsapp: error ({e})"),
            }

            if cfg.bitrix24.domain.is_empty() {
                println!("  bitrix24: not configured");
            } else {
                println!("  bitrix24: configured ({})", cfg.bitrix24.domain);
            }
        }
    }

    Ok(())
}

/// Initialize tracing: stderr by default, a daily-rolling file when a log
/// directory is configured.
fn init_tracing(app: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(app.log_level.clone()));

    if app.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    } else {
        let appender = tracing_appender::rolling::daily(&app.log_dir, "bridge24.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    }
}
