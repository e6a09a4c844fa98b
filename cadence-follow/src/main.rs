//! Cadence follow — entry point.
//!
//! ```text
//! cadence-follow                   Run with defaults (lead at 127.0.0.1:12345)
//! cadence-follow --config <path>   Load a custom config TOML
//! cadence-follow --gen-config      Write the default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadence_core::follow::FollowNode;
use cadence_core::state::Shutdown;

mod config;
use config::FollowConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cadence-follow", about = "Cadence follow node")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "cadence-follow.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

// One control loop, no parallel workers: the current-thread runtime is
// the whole concurrency model.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", toml::to_string_pretty(&FollowConfig::default())?);
        return Ok(());
    }

    let config = FollowConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cadence-follow v{}", env!("CARGO_PKG_VERSION"));
    info!("lead: {}", config.lead_addr());

    let mut node = FollowNode::connect(
        &config.lead_addr(),
        &config.peers.listen_addr,
        config.poll_timeout(),
    )
    .await?;
    info!("peers may dial {}", node.local_addr()?);

    // Both nominal exit paths — loss of the lead and an external
    // interrupt — fall through to the one cleanup point below. An
    // interrupt drops the loop future where it stands; the node and its
    // sockets stay intact for `shutdown` to close.
    let outcome = tokio::select! {
        result = node.run() => result,
        _ = tokio::signal::ctrl_c() => Ok(Shutdown::Interrupted),
    };

    node.shutdown();

    match outcome {
        Ok(Shutdown::Interrupted) => {
            info!("interrupted; shut down cleanly");
            Ok(())
        }
        Ok(Shutdown::LeadClosed) => {
            warn!("control connection closed by the lead");
            Err("lost connection to the lead".into())
        }
        Err(e) => Err(e.into()),
    }
}
