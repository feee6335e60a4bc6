// src/subgraph.rs
use crate::contracts::ICFAv1Forwarder;
use crate::error::{Error, Result};
use crate::models::{AgreementKind, Flow};
use crate::parser::{self, RawId, RawSnapshot};
use crate::rpc::HttpProvider;
use alloy::primitives::{Address, I256};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-flow ceiling, handed to flow sources that want to pre-order results.
pub type CeilingFn<'a> = dyn Fn(&Flow) -> u128 + Send + Sync + 'a;

/// Supplies the flows of one token that are past the deposit threshold.
#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn flows_to_liquidate(
        &self,
        token: Address,
        forwarder: Address,
        deposit_consumed_pct_threshold: f64,
        ceiling: &CeilingFn<'_>,
    ) -> Result<Vec<Flow>>;
}

/// Supplies the token universe for all-token mode.
#[async_trait]
pub trait TokenListing: Send + Sync {
    async fn super_tokens(&self, listed_only: bool) -> Result<Vec<Address>>;
}

const PAGE_SIZE: usize = 1000;

/// `first:` of the nested outflow and distributor lists in the snapshot query.
const NESTED_PAGE_SIZE: usize = 1000;

const CRITICAL_SNAPSHOTS_QUERY: &str = r#"
query CriticalSnapshots($token: String!, $now: BigInt!, $lastId: ID!, $first: Int!) {
  accountTokenSnapshots(
    first: $first
    orderBy: id
    orderDirection: asc
    where: { token: $token, maybeCriticalAtTimestamp_lt: $now, id_gt: $lastId }
  ) {
    id
    maybeCriticalAtTimestamp
    account {
      id
      outflows(first: 1000, where: { token: $token, currentFlowRate_gt: "0" }) {
        receiver { id }
        currentFlowRate
      }
      poolDistributors(first: 1000, where: { pool_: { token: $token }, flowRate_gt: "0" }) {
        pool { id }
        flowRate
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotsPage {
    account_token_snapshots: Vec<RawSnapshot>,
}

/// Nested lists are not paginated; a full list means flows may be missing.
fn warn_if_truncated(snapshot: &RawSnapshot) -> bool {
    let account = &snapshot.account;
    let truncated = account.outflows.len() >= NESTED_PAGE_SIZE
        || account.pool_distributors.len() >= NESTED_PAGE_SIZE;
    if truncated {
        warn!(
            snapshot = %snapshot.id,
            outflows = account.outflows.len(),
            distributions = account.pool_distributors.len(),
            "Nested flow list hit the page limit, remaining flows are picked up in a later run"
        );
    }
    truncated
}

#[derive(Debug, Deserialize)]
struct TokensPage {
    tokens: Vec<RawId>,
}

fn tokens_query(listed_only: bool) -> String {
    let listed = if listed_only { ", isListed: true" } else { "" };
    format!(
        "query Tokens($lastId: ID!, $first: Int!) {{ tokens(first: $first, orderBy: id, orderDirection: asc, where: {{ isSuperToken: true{listed}, id_gt: $lastId }}) {{ id }} }}"
    )
}

/// Protocol subgraph client; flows of CFA streams are re-checked on chain
/// through the forwarder when a provider is attached.
#[derive(Clone)]
pub struct SubgraphClient {
    http: Client,
    url: String,
    provider: Option<HttpProvider>,
}

impl SubgraphClient {
    pub fn new(url: &str, provider: Option<HttpProvider>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("subgraph http client: {}", e)))?;

        Ok(Self {
            http,
            url: url.to_string(),
            provider,
        })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let payload = json!({ "query": query, "variables": variables });

        debug!("Sending subgraph query → {}", self.url);

        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::FlowSource(format!("subgraph request failed: {}", e)))?;

        if resp.status() != StatusCode::OK {
            return Err(Error::FlowSource(format!(
                "subgraph error: HTTP {}",
                resp.status()
            )));
        }

        let parsed: GraphResponse<T> = resp
            .json()
            .await
            .map_err(|e| Error::FlowSource(format!("subgraph decode failed: {}", e)))?;

        if let Some(err) = parsed.errors.first() {
            return Err(Error::FlowSource(format!("subgraph query error: {}", err.message)));
        }
        parsed
            .data
            .ok_or_else(|| Error::FlowSource("subgraph returned no data".into()))
    }

    async fn critical_snapshots(&self, token: Address, now: i64) -> Result<Vec<RawSnapshot>> {
        let mut out = Vec::new();
        let mut last_id = String::new();

        loop {
            let page: SnapshotsPage = self
                .query(
                    CRITICAL_SNAPSHOTS_QUERY,
                    json!({
                        "token": format!("{:#x}", token),
                        "now": now.to_string(),
                        "lastId": last_id,
                        "first": PAGE_SIZE,
                    }),
                )
                .await?;

            let count = page.account_token_snapshots.len();
            if let Some(last) = page.account_token_snapshots.last() {
                last_id = last.id.clone();
            }
            out.extend(page.account_token_snapshots);

            if count < PAGE_SIZE {
                break;
            }
        }

        Ok(out)
    }

    /// Live CFA flowrate via the forwarder. `None` when the lookup fails.
    async fn onchain_flowrate(&self, forwarder: Address, flow: &Flow) -> Option<I256> {
        let provider = self.provider.as_ref()?;
        let contract = ICFAv1Forwarder::new(forwarder, provider.clone());

        match contract
            .getFlowrate(flow.token, flow.sender, flow.receiver)
            .call()
            .await
        {
            Ok(rate) => i128::try_from(rate).ok().and_then(|r| I256::try_from(r).ok()),
            Err(e) => {
                warn!(
                    sender = %flow.sender,
                    receiver = %flow.receiver,
                    "Forwarder flowrate lookup failed: {}", e
                );
                None
            }
        }
    }
}

#[async_trait]
impl FlowSource for SubgraphClient {
    async fn flows_to_liquidate(
        &self,
        token: Address,
        forwarder: Address,
        deposit_consumed_pct_threshold: f64,
        ceiling: &CeilingFn<'_>,
    ) -> Result<Vec<Flow>> {
        let now = chrono::Utc::now().timestamp();
        let snapshots = self.critical_snapshots(token, now).await?;
        info!(
            token = %token,
            "Found {} critical account snapshots",
            snapshots.len()
        );

        let candidates: Vec<Flow> = snapshots
            .iter()
            .inspect(|s| {
                warn_if_truncated(s);
            })
            .flat_map(|s| parser::decode_snapshot(token, s, now, deposit_consumed_pct_threshold))
            .collect();

        let mut flows = Vec::with_capacity(candidates.len());
        for mut flow in candidates {
            if flow.agreement == AgreementKind::Cfa {
                match self.onchain_flowrate(forwarder, &flow).await {
                    Some(rate) if rate.is_zero() => {
                        debug!(sender = %flow.sender, receiver = %flow.receiver, "Stream already closed");
                        continue;
                    }
                    Some(rate) => flow.flowrate = rate,
                    None => {}
                }
            }
            debug!(
                sender = %flow.sender,
                receiver = %flow.receiver,
                pct = flow.consumed_deposit_pct,
                ceiling = ceiling(&flow),
                "Liquidation candidate"
            );
            flows.push(flow);
        }

        flows.sort_by_cached_key(|f| std::cmp::Reverse(ceiling(f)));
        Ok(flows)
    }
}

#[async_trait]
impl TokenListing for SubgraphClient {
    async fn super_tokens(&self, listed_only: bool) -> Result<Vec<Address>> {
        let query = tokens_query(listed_only);
        let mut tokens = Vec::new();
        let mut last_id = String::new();

        loop {
            let page: TokensPage = self
                .query(&query, json!({ "lastId": last_id, "first": PAGE_SIZE }))
                .await?;

            let count = page.tokens.len();
            if let Some(last) = page.tokens.last() {
                last_id = last.id.clone();
            }
            for raw in page.tokens {
                match parser::parse_address(&raw.id) {
                    Some(addr) => tokens.push(addr),
                    None => warn!("Skipping token with bad id {}", raw.id),
                }
            }

            if count < PAGE_SIZE {
                break;
            }
        }

        Ok(tokens)
    }
}
