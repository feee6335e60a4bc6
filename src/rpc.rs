// src/rpc.rs
use crate::error::{Error, Result};
use crate::models::{ContractCall, TxRequest};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, TransactionBuilder, TxSignerSync};
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub type HttpProvider = RootProvider<Ethereum>;

/// Chain RPC boundary used by the pipeline.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Account that signs and pays for liquidations.
    fn sender(&self) -> Address;

    /// Current network gas price, `None` when the node reports nothing usable.
    async fn gas_price(&self) -> Result<Option<u128>>;

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64>;

    async fn transaction_count(&self, account: Address) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    /// Returns the EIP-2718 encoded signed transaction.
    async fn sign(&self, tx: &TxRequest) -> Result<Bytes>;

    /// Sends a signed transaction and waits for a successful receipt.
    async fn broadcast(&self, raw: Bytes) -> Result<B256>;
}

/// `NetworkClient` backed by an alloy HTTP provider and a local key.
#[derive(Clone)]
pub struct AlloyClient {
    provider: HttpProvider,
    signer: Option<PrivateKeySigner>,
    sender: Address,
    confirmation_timeout: Duration,
}

impl AlloyClient {
    pub fn connect(
        rpc_url: &str,
        signer: Option<PrivateKeySigner>,
        sender: Address,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid RPC URL {}: {}", rpc_url, e)))?;

        info!("Connecting to RPC {}", rpc_url);

        Ok(Self {
            provider: RootProvider::new_http(url),
            signer,
            sender,
            confirmation_timeout,
        })
    }

    pub fn provider(&self) -> &HttpProvider {
        &self.provider
    }
}

#[async_trait]
impl NetworkClient for AlloyClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn gas_price(&self) -> Result<Option<u128>> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| Error::Rpc(format!("eth_gasPrice: {}", e)))?;
        debug!(gas_price = price, "Fetched network gas price");
        Ok((price > 0).then_some(price))
    }

    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64> {
        let request = TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_input(call.data.clone());

        self.provider
            .estimate_gas(request)
            .await
            .map_err(|e| Error::Estimation(e.to_string()))
    }

    async fn transaction_count(&self, account: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(|e| Error::Rpc(format!("eth_getTransactionCount: {}", e)))
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| Error::Rpc(format!("eth_chainId: {}", e)))
    }

    async fn sign(&self, tx: &TxRequest) -> Result<Bytes> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::Signing("no signing key configured".into()))?;
        let nonce = tx
            .nonce
            .ok_or_else(|| Error::Signing("nonce not resolved".into()))?;
        let chain_id = tx
            .chain_id
            .ok_or_else(|| Error::Signing("chain id not resolved".into()))?;

        let mut legacy = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: U256::ZERO,
            input: tx.data.clone(),
        };

        let sig = TxSignerSync::sign_transaction_sync(signer, &mut legacy)
            .map_err(|e| Error::Signing(e.to_string()))?;
        let signed: TxEnvelope = legacy.into_signed(sig).into();
        Ok(signed.encoded_2718().into())
    }

    async fn broadcast(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| Error::Broadcast(e.to_string()))?;
        let hash = *pending.tx_hash();
        info!(tx_hash = %hash, "Transaction sent, waiting for receipt");

        let receipt = pending
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| Error::Confirmation {
                hash: hash.to_string(),
                reason: e.to_string(),
            })?;

        if !receipt.status() {
            return Err(Error::Confirmation {
                hash: hash.to_string(),
                reason: "transaction reverted".into(),
            });
        }
        Ok(hash)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::consensus::Transaction;
    use alloy::eips::eip2718::Decodable2718;

    fn client(signer: Option<PrivateKeySigner>) -> AlloyClient {
        let sender = signer.as_ref().map(|s| s.address()).unwrap_or(Address::ZERO);
        // nothing is dialed until a request is made
        AlloyClient::connect("http://127.0.0.1:1", signer, sender, Duration::from_secs(1)).unwrap()
    }

    fn request() -> TxRequest {
        TxRequest {
            from: Address::ZERO,
            to: Address::repeat_byte(0xbb),
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            gas_limit: 150_000,
            gas_price: 1_080_000_000,
            chain_id: Some(137),
            nonce: Some(7),
        }
    }

    #[tokio::test]
    async fn signs_eip155_legacy_transaction() {
        let signer = PrivateKeySigner::random();
        let expected = signer.address();
        let raw = client(Some(signer)).sign(&request()).await.unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let legacy = envelope.as_legacy().expect("legacy transaction");
        assert_eq!(legacy.tx().chain_id, Some(137));
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.gas_limit(), 150_000);
        assert_eq!(envelope.gas_price(), Some(1_080_000_000));
        assert_eq!(envelope.to(), Some(Address::repeat_byte(0xbb)));
        assert_eq!(envelope.input().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(envelope.recover_signer().unwrap(), expected);
    }

    #[tokio::test]
    async fn unresolved_nonce_or_chain_id_is_rejected() {
        let client = client(Some(PrivateKeySigner::random()));

        let mut tx = request();
        tx.nonce = None;
        assert!(matches!(client.sign(&tx).await, Err(Error::Signing(_))));

        let mut tx = request();
        tx.chain_id = None;
        assert!(matches!(client.sign(&tx).await, Err(Error::Signing(_))));
    }

    #[tokio::test]
    async fn signing_without_key_fails() {
        let client = client(None);
        assert!(matches!(client.sign(&request()).await, Err(Error::Signing(_))));
    }

    #[test]
    fn bad_rpc_url_is_a_config_error() {
        let res = AlloyClient::connect("not a url", None, Address::ZERO, Duration::from_secs(1));
        assert!(matches!(res, Err(Error::Config(_))));
    }
}
