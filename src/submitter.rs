// src/submitter.rs
use crate::assembler::Assembler;
use crate::error::Result;
use crate::models::{Batch, SubmissionOutcome, TxRequest};
use crate::rpc::NetworkClient;
use alloy::primitives::{Address, B256};
use tracing::{error, info};

/// Signs and broadcasts batch transactions one at a time.
///
/// Nonce and chain id are resolved right before signing. Batches must be
/// submitted sequentially: nothing here reserves nonces.
#[derive(Debug, Clone)]
pub struct Submitter {
    dry_run: bool,
}

impl Submitter {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Assembles and submits one batch. Never returns an error: every failure
    /// becomes `SubmissionOutcome::Failed` after being logged with the batch.
    pub async fn process_batch<C: NetworkClient + ?Sized>(
        &self,
        client: &C,
        assembler: &Assembler,
        token: Address,
        batch: &Batch,
        gas_price: u128,
    ) -> SubmissionOutcome {
        let tx = match assembler.assemble(client, token, batch, gas_price).await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    token = %token,
                    flows = batch.len(),
                    batch = %batch.describe(),
                    "Batch assembly failed: {}", e
                );
                return SubmissionOutcome::Failed(e.to_string());
            }
        };
        self.submit(client, tx, batch).await
    }

    pub async fn submit<C: NetworkClient + ?Sized>(
        &self,
        client: &C,
        tx: TxRequest,
        batch: &Batch,
    ) -> SubmissionOutcome {
        match self.try_submit(client, tx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    token = %batch.token,
                    flows = batch.len(),
                    batch = %batch.describe(),
                    "Batch submission failed: {}", e
                );
                SubmissionOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_submit<C: NetworkClient + ?Sized>(
        &self,
        client: &C,
        mut tx: TxRequest,
    ) -> Result<SubmissionOutcome> {
        tx.chain_id = Some(client.chain_id().await?);
        tx.nonce = Some(client.transaction_count(tx.from).await?);

        if self.dry_run {
            info!(
                to = %tx.to,
                nonce = ?tx.nonce,
                chain_id = ?tx.chain_id,
                gas_limit = tx.gas_limit,
                gas_price = tx.gas_price,
                data = %tx.data,
                "Dry-run: transaction assembled, not signed"
            );
            return Ok(SubmissionOutcome::DryRun(tx));
        }

        let raw = client.sign(&tx).await?;
        let hash: B256 = client.broadcast(raw).await?;
        info!(
            tx_hash = %hash,
            nonce = ?tx.nonce,
            gas_price = tx.gas_price,
            "Batch transaction confirmed"
        );
        Ok(SubmissionOutcome::Broadcast(hash))
    }
}
