use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use holder_ledger::config::Config;
use holder_ledger::export::{self, csv::read_transfers_file};
use holder_ledger::indexer::node::connect_http;
use holder_ledger::pipeline::{analyze_events, run_backfill};
use holder_ledger::progress::TracingProgress;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for per-chunk output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Holder ledger starting");

    // holder-ledger [config.toml] [transfers.csv]
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());
    let stored_transfers = args.next();

    let config = Config::load(&config_path)?;
    tracing::info!(
        contract = %config.contract_address,
        start_block = config.start_block,
        end_block = ?config.end_block,
        "Configuration loaded from {}",
        config_path
    );

    let report = match stored_transfers {
        Some(path) => {
            let events = read_transfers_file(&path)?;
            analyze_events(&config, events)?
        }
        None => {
            let node = connect_http(&config.rpc_endpoint)?;
            tracing::info!(rpc = %config.rpc_endpoint, "Connected to RPC endpoint");

            // Ctrl+C abandons in-flight requests; no partial report is written.
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received, stopping backfill...");
                    signal.cancel();
                }
            });

            let progress = TracingProgress::new(config.contract_address.clone());
            run_backfill(&config, &node, shutdown, &progress).await?
        }
    };

    export::log_report(&report);

    let stamp = export::run_stamp(chrono::Utc::now());
    let written = export::write_report(&config.output, &report, &stamp)?;
    tracing::info!(
        files = written.len(),
        dir = %config.output.dir.display(),
        "Holder ledger finished"
    );
    Ok(())
}
