//! Cadence lead — entry point.
//!
//! ```text
//! cadence-lead                     Listen on 0.0.0.0:12345
//! cadence-lead --listen <addr>     Listen on a custom address
//! ```
//!
//! Each line typed on the console toggles the round: the first broadcast
//! is REQUEST_UPDATE, the next UPDATE_COMPLETE, and so on.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod lead;
use lead::Lead;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cadence-lead", about = "Cadence lead node")]
struct Cli {
    /// Address to listen on for follow connections.
    #[arg(short, long, default_value = "0.0.0.0:12345")]
    listen: String,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cadence-lead v{}", env!("CARGO_PKG_VERSION"));

    let mut lead = Lead::bind(&cli.listen).await?;

    // The fan-out loop runs until interrupted; cleanup is unconditional.
    let outcome = tokio::select! {
        result = lead.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    };

    lead.shutdown();
    outcome.map_err(Into::into)
}
