//! Three mailboxes in a row: `a` sends packets to `c` through `b`.
//!
//! Usage: `mailsync-demo [--count N] [--db-dir DIR]`. Without `--db-dir`
//! the mailboxes live in memory. Set `RUST_LOG` to change the log level.

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailsync::{
    memory_chain, run_simulation, sqlite_chain, EndpointName, SimulationConfig,
    SimulationOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "mailsync-demo")]
#[command(about = "Relay packets through a chain of mailboxes and sync them forth and back")]
struct Args {
    /// Packets the first mailbox sends to the last
    #[arg(short, long, default_value = "39")]
    count: usize,

    /// Keep the mailboxes in SQLite files under this directory
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Mailbox names, head first
    #[arg(long, value_delimiter = ',', default_value = "a,b,c")]
    mailboxes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let names = args
        .mailboxes
        .iter()
        .map(|n| EndpointName::new(n.as_str()).with_context(|| format!("bad mailbox name {n:?}")))
        .collect::<Result<Vec<_>>>()?;

    let config = SimulationConfig {
        packet_count: args.count,
        ..SimulationConfig::default()
    };

    let outcome = match &args.db_dir {
        Some(dir) => {
            let chain = sqlite_chain(dir, &names, &config.endpoint)
                .await
                .with_context(|| format!("opening mailboxes in {}", dir.display()))?;
            run_simulation(chain, &config).await?
        }
        None => run_simulation(memory_chain(&names, &config.endpoint), &config).await?,
    };

    print_outcome(&outcome)?;
    ensure!(
        outcome.delivered.len() == outcome.sent.len(),
        "delivered {} of {} packets",
        outcome.delivered.len(),
        outcome.sent.len()
    );
    Ok(())
}

fn print_outcome(outcome: &SimulationOutcome) -> Result<()> {
    for snapshot in &outcome.snapshots {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    }
    let report = &outcome.report;
    println!(
        "sent {}, delivered {}, relayed {}, headers {}, fetches {}, skipped {}",
        outcome.sent.len(),
        outcome.delivered.len(),
        report.stored,
        report.headers_fetched,
        report.packets_fetched,
        report.skipped
    );
    Ok(())
}
