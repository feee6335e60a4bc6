// src/models.rs
use alloy::primitives::{Address, Bytes, B256, I256};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which agreement a flow lives under; selects the termination path on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgreementKind {
    /// Constant flow agreement (sender -> receiver stream)
    Cfa,
    /// General distribution agreement (distributor -> pool)
    Gda,
}

impl AgreementKind {
    /// Discriminant used by the batch liquidator's `FlowType` enum.
    pub fn as_u8(self) -> u8 {
        match self {
            AgreementKind::Cfa => 0,
            AgreementKind::Gda => 1,
        }
    }
}

/// Snapshot of one open flow that a flow source considers liquidatable.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub token: Address,
    pub sender: Address,
    pub receiver: Address,
    pub agreement: AgreementKind,
    /// Base units per second, 18-decimal fixed point.
    pub flowrate: I256,
    /// 100 = just insolvent, every further 100 is another 4 hours.
    pub consumed_deposit_pct: f64,
}

/// A flow together with the highest gas price worth paying to close it.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedFlow {
    pub flow: Flow,
    pub max_gas_price: u128,
}

/// Ordered, size-bounded group of flows closed in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub token: Address,
    pub entries: Vec<PricedFlow>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Short human-readable listing for log lines.
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{:?}:{}->{}@{}",
                    e.flow.agreement, e.flow.sender, e.flow.receiver, e.max_gas_price
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Read-only call used for gas estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// A fully specified, unsigned batch transaction.
///
/// `chain_id` and `nonce` stay empty until the submitter resolves them right
/// before signing.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub chain_id: Option<u64>,
    pub nonce: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Broadcast(B256),
    DryRun(TxRequest),
    Failed(String),
}

/// Aggregated counters for one pass over the token universe.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub tokens_processed: usize,
    pub tokens_without_gas_price: usize,
    pub flows_fetched: usize,
    pub flows_selected: usize,
    pub batches_broadcast: usize,
    pub batches_dry_run: usize,
    pub batches_failed: usize,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            tokens_processed: 0,
            tokens_without_gas_price: 0,
            flows_fetched: 0,
            flows_selected: 0,
            batches_broadcast: 0,
            batches_dry_run: 0,
            batches_failed: 0,
        }
    }

    pub fn record(&mut self, outcome: &SubmissionOutcome) {
        match outcome {
            SubmissionOutcome::Broadcast(_) => self.batches_broadcast += 1,
            SubmissionOutcome::DryRun(_) => self.batches_dry_run += 1,
            SubmissionOutcome::Failed(_) => self.batches_failed += 1,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
