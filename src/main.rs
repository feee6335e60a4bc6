use eyre::eyre;
use flow_liquidator::assembler::Assembler;
use flow_liquidator::orchestrator::{Liquidator, RunSettings};
use flow_liquidator::price_table::TokenPriceTable;
use flow_liquidator::rpc::AlloyClient;
use flow_liquidator::subgraph::SubgraphClient;
use flow_liquidator::submitter::Submitter;
use flow_liquidator::{config, error::Error, logging};
use tracing::info;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    info!("Flow liquidator starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("  RPC URL: {}", cfg.rpc_http_url);
    info!("  Network: {}", cfg.network);
    info!("  Batch contract: {}", cfg.batch_contract);
    info!("  Sender: {}", cfg.sender());
    info!("  Mode: {}", if cfg.dry_run { "dry-run" } else { "live" });
    match cfg.token {
        Some(token) => info!("  Token: {}", token),
        None => info!("  Tokens: all (listed only: {})", cfg.listed_only),
    }

    let prices = TokenPriceTable::load(&cfg.price_table_path)?;
    if !prices.has_network(&cfg.network) {
        return Err(eyre!(Error::Config(format!(
            "network {} missing from price table {}",
            cfg.network, cfg.price_table_path
        ))));
    }

    let client = AlloyClient::connect(
        &cfg.rpc_http_url,
        cfg.signer.clone(),
        cfg.sender(),
        cfg.confirmation_timeout,
    )?;
    let subgraph = SubgraphClient::new(&cfg.subgraph_url, Some(client.provider().clone()))?;

    let liquidator = Liquidator::new(
        &client,
        &subgraph,
        &subgraph,
        prices.for_network(&cfg.network),
        RunSettings::from(&cfg),
        Assembler::new(cfg.batch_contract, cfg.gas_limit_multiplier),
        Submitter::new(cfg.dry_run),
    );

    match cfg.loop_interval {
        Some(interval) => {
            info!("Loop mode, interval {:?}", interval);
            let runs = liquidator.run_loop(interval).await?;
            info!("Completed {} runs", runs);
        }
        None => {
            let report = liquidator.run_once().await?;
            info!("Run report: {}", serde_json::to_string(&report)?);
        }
    }

    info!("Flow liquidator stopped.");
    Ok(())
}
