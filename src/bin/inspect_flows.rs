use eyre::eyre;
use flow_liquidator::gas_policy::{base_ceiling, max_gas_price, time_decay_multiplier};
use flow_liquidator::models::Flow;
use flow_liquidator::price_table::TokenPriceTable;
use flow_liquidator::rpc::{AlloyClient, NetworkClient};
use flow_liquidator::selector;
use flow_liquidator::subgraph::{FlowSource, SubgraphClient};
use flow_liquidator::{config, logging};

/// Prints what the liquidator would decide for `TOKEN` right now. Never signs.
#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = config::load_read_only()?;
    let token = cfg
        .token
        .ok_or_else(|| eyre!("TOKEN must be set to inspect flows"))?;

    let table = TokenPriceTable::load(&cfg.price_table_path)?;
    let prices = table.for_network(&cfg.network);

    let client = AlloyClient::connect(&cfg.rpc_http_url, None, cfg.sender(), cfg.confirmation_timeout)?;
    let subgraph = SubgraphClient::new(&cfg.subgraph_url, Some(client.provider().clone()))?;

    let gas_price = client.gas_price().await?.unwrap_or(0);
    let ceiling = |flow: &Flow| max_gas_price(flow, prices, &cfg.policy);
    let flows = subgraph
        .flows_to_liquidate(token, cfg.cfa_forwarder, cfg.deposit_consumed_pct_threshold, &ceiling)
        .await?;

    println!("Token {} on {}: {} flows, gas price {}", token, cfg.network, flows.len(), gas_price);
    println!("USD price: {:?}", prices.price(&token));

    for priced in selector::price_flows(&flows, prices, &cfg.policy) {
        let flow = &priced.flow;
        println!(
            "{:?} {} -> {} | rate {} | {:.1}% | base {} x{:.3} = {} | {}",
            flow.agreement,
            flow.sender,
            flow.receiver,
            flow.flowrate,
            flow.consumed_deposit_pct,
            base_ceiling(flow, prices.price(&token), &cfg.policy),
            time_decay_multiplier(flow.consumed_deposit_pct),
            priced.max_gas_price,
            if priced.max_gas_price >= gas_price { "LIQUIDATE" } else { "skip" }
        );
    }

    Ok(())
}
