// src/assembler.rs
use crate::contracts::IBatchLiquidator::{self, FlowLiquidationData, FlowType};
use crate::error::{Error, Result};
use crate::models::{AgreementKind, Batch, ContractCall, TxRequest};
use crate::rpc::NetworkClient;
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use tracing::debug;

/// Safety margin over the fee seen at selection time, as numerator/denominator.
pub const BID_MARGIN_NUM: u128 = 12;
pub const BID_MARGIN_DEN: u128 = 10;

/// Gas price one batch transaction bids: current fee plus 20%.
pub fn bid_gas_price(current_gas_price: u128) -> u128 {
    current_gas_price.saturating_mul(BID_MARGIN_NUM) / BID_MARGIN_DEN
}

/// Turns a selected batch into a gas-estimated, unsigned transaction.
#[derive(Debug, Clone)]
pub struct Assembler {
    batch_contract: Address,
    gas_limit_multiplier: f64,
}

impl Assembler {
    pub fn new(batch_contract: Address, gas_limit_multiplier: f64) -> Self {
        Self {
            batch_contract,
            gas_limit_multiplier,
        }
    }

    /// Encodes `deleteFlows(token, [(kind, sender, receiver)..])`.
    ///
    /// Fails with `InvariantViolation` if any flow belongs to another token.
    pub fn encode(&self, token: Address, batch: &Batch) -> Result<Bytes> {
        if let Some(stray) = batch.entries.iter().find(|e| e.flow.token != token) {
            return Err(Error::InvariantViolation {
                token,
                found: stray.flow.token,
            });
        }

        let data = batch
            .entries
            .iter()
            .map(|e| FlowLiquidationData {
                agreementOperation: match e.flow.agreement {
                    AgreementKind::Cfa => FlowType::ConstantFlowAgreement,
                    AgreementKind::Gda => FlowType::GeneralDistributionAgreement,
                },
                sender: e.flow.sender,
                receiver: e.flow.receiver,
            })
            .collect();

        let call = IBatchLiquidator::deleteFlowsCall {
            superToken: token,
            data,
        };
        Ok(call.abi_encode().into())
    }

    pub fn gas_limit(&self, estimate: u64) -> u64 {
        (estimate as f64 * self.gas_limit_multiplier).ceil() as u64
    }

    pub async fn assemble<C: NetworkClient + ?Sized>(
        &self,
        client: &C,
        token: Address,
        batch: &Batch,
        gas_price: u128,
    ) -> Result<TxRequest> {
        let data = self.encode(token, batch)?;
        let call = ContractCall {
            from: client.sender(),
            to: self.batch_contract,
            data,
        };

        let estimate = client.estimate_gas(&call).await?;
        let gas_limit = self.gas_limit(estimate);
        debug!(
            token = %token,
            flows = batch.len(),
            estimate,
            gas_limit,
            "Estimated batch gas"
        );

        Ok(TxRequest {
            from: call.from,
            to: call.to,
            data: call.data,
            gas_limit,
            gas_price,
            chain_id: None,
            nonce: None,
        })
    }
}
