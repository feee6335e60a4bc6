// src/orchestrator.rs
use crate::assembler::{bid_gas_price, Assembler};
use crate::config::Config;
use crate::error::Error;
use crate::gas_policy::{max_gas_price, GasPricePolicyConfig};
use crate::models::{Flow, RunReport, SubmissionOutcome};
use crate::price_table::NetworkPrices;
use crate::rpc::NetworkClient;
use crate::selector;
use crate::subgraph::{FlowSource, TokenListing};
use crate::submitter::Submitter;
use alloy::primitives::Address;
use eyre::Result;
use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Per-run knobs, split from `Config` so a pipeline can be built without env.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub token: Option<Address>,
    pub listed_only: bool,
    pub forwarder: Address,
    pub deposit_consumed_pct_threshold: f64,
    pub batch_size: usize,
    pub policy: GasPricePolicyConfig,
}

impl From<&Config> for RunSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            token: cfg.token,
            listed_only: cfg.listed_only,
            forwarder: cfg.cfa_forwarder,
            deposit_consumed_pct_threshold: cfg.deposit_consumed_pct_threshold,
            batch_size: cfg.batch_size,
            policy: cfg.policy,
        }
    }
}

/// Drives tokens → flows → batches → transactions, strictly sequentially.
pub struct Liquidator<'a, C: ?Sized, F: ?Sized, L: ?Sized> {
    client: &'a C,
    flow_source: &'a F,
    listing: &'a L,
    prices: NetworkPrices<'a>,
    settings: RunSettings,
    assembler: Assembler,
    submitter: Submitter,
}

impl<'a, C, F, L> Liquidator<'a, C, F, L>
where
    C: NetworkClient + ?Sized,
    F: FlowSource + ?Sized,
    L: TokenListing + ?Sized,
{
    pub fn new(
        client: &'a C,
        flow_source: &'a F,
        listing: &'a L,
        prices: NetworkPrices<'a>,
        settings: RunSettings,
        assembler: Assembler,
        submitter: Submitter,
    ) -> Self {
        Self {
            client,
            flow_source,
            listing,
            prices,
            settings,
            assembler,
            submitter,
        }
    }

    async fn resolve_tokens(&self) -> Result<Vec<Address>> {
        if let Some(token) = self.settings.token {
            info!(token = %token, "Single token mode");
            return Ok(vec![token]);
        }
        let tokens = self.listing.super_tokens(self.settings.listed_only).await?;
        info!(
            listed_only = self.settings.listed_only,
            "Resolved {} tokens",
            tokens.len()
        );
        Ok(tokens)
    }

    fn ceiling(&self, flow: &Flow) -> u128 {
        max_gas_price(flow, self.prices, &self.settings.policy)
    }

    /// One full pass over the token universe.
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut report = RunReport::new();
        let tokens = self.resolve_tokens().await?;

        for token in tokens {
            report.tokens_processed += 1;
            if let Err(e) = self.process_token(token, &mut report).await {
                if matches!(e.downcast_ref::<Error>(), Some(Error::MissingGasPrice)) {
                    report.tokens_without_gas_price += 1;
                }
                error!(token = %token, "Token skipped: {:?}", e);
            }
        }

        info!(
            tokens = report.tokens_processed,
            flows_fetched = report.flows_fetched,
            flows_selected = report.flows_selected,
            broadcast = report.batches_broadcast,
            dry_run = report.batches_dry_run,
            failed = report.batches_failed,
            "Run finished"
        );
        Ok(report)
    }

    async fn process_token(&self, token: Address, report: &mut RunReport) -> Result<()> {
        let ceiling = |flow: &Flow| self.ceiling(flow);
        let flows = self
            .flow_source
            .flows_to_liquidate(
                token,
                self.settings.forwarder,
                self.settings.deposit_consumed_pct_threshold,
                &ceiling,
            )
            .await?;

        report.flows_fetched += flows.len();
        if flows.is_empty() {
            info!(token = %token, "No flows to liquidate");
            return Ok(());
        }
        info!(token = %token, "Fetched {} flows to liquidate", flows.len());

        let current_gas_price = self
            .client
            .gas_price()
            .await?
            .ok_or(Error::MissingGasPrice)?;

        let priced = selector::price_flows(&flows, self.prices, &self.settings.policy);
        let batches = selector::select(token, priced, current_gas_price, self.settings.batch_size);
        let selected: usize = batches.iter().map(|b| b.len()).sum();
        report.flows_selected += selected;

        info!(
            token = %token,
            gas_price = current_gas_price,
            "Selected {} of {} flows into {} batches",
            selected,
            flows.len(),
            batches.len()
        );
        if batches.is_empty() {
            return Ok(());
        }

        let bid = bid_gas_price(current_gas_price);
        for (i, batch) in batches.iter().enumerate() {
            info!(
                token = %token,
                batch = i + 1,
                of = batches.len(),
                flows = batch.len(),
                bid,
                "Submitting batch"
            );
            let outcome = self
                .submitter
                .process_batch(self.client, &self.assembler, token, batch, bid)
                .await;
            match &outcome {
                SubmissionOutcome::Broadcast(hash) => {
                    info!(token = %token, tx_hash = %hash, "Batch liquidated")
                }
                SubmissionOutcome::DryRun(_) => info!(token = %token, "Batch recorded (dry-run)"),
                SubmissionOutcome::Failed(reason) => {
                    warn!(token = %token, batch = i + 1, "Batch failed: {}", reason)
                }
            }
            report.record(&outcome);
        }

        Ok(())
    }

    /// Repeats `run_once` every `interval` until ctrl-c. The handler is
    /// installed before the first run; a signal received mid-run takes effect
    /// once that run has finished.
    pub async fn run_loop(&self, interval: Duration) -> Result<usize> {
        self.run_until(interval, async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Loop body of `run_loop` with an arbitrary shutdown trigger. Returns the
    /// number of completed runs.
    pub async fn run_until<S>(&self, interval: Duration, shutdown: S) -> Result<usize>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let mut stop = tokio::spawn(shutdown);
        tokio::task::yield_now().await;

        let mut runs = 0;
        loop {
            if let Err(e) = self.run_once().await {
                warn!("Run failed: {:?}", e);
            }
            runs += 1;

            if stop.is_finished() {
                info!("Shutdown signal received during run, stopping...");
                return Ok(runs);
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = &mut stop => {
                    info!("Shutdown signal received, stopping...");
                    return Ok(runs);
                }
            }
        }
    }
}
