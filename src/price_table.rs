// src/price_table.rs
use crate::error::{Error, Result};
use alloy::primitives::Address;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// USD unit prices per network, keyed by lower-cased token address.
///
/// Produced out-of-band by the price ingestion job and only ever read here.
#[derive(Debug, Clone, Default)]
pub struct TokenPriceTable {
    networks: HashMap<String, HashMap<String, f64>>,
}

impl TokenPriceTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::PriceTable(format!("read {}: {}", path.display(), e)))?;
        let table = Self::from_json(&text)?;
        info!(
            "Loaded price table from {} ({} networks)",
            path.display(),
            table.networks.len()
        );
        Ok(table)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, f64>> =
            serde_json::from_str(text).map_err(|e| Error::PriceTable(e.to_string()))?;

        let mut networks = HashMap::with_capacity(raw.len());
        for (network, prices) in raw {
            let mut normalized = HashMap::with_capacity(prices.len());
            for (token, price) in prices {
                if !price.is_finite() || price < 0.0 {
                    return Err(Error::PriceTable(format!(
                        "invalid price {} for {} on {}",
                        price, token, network
                    )));
                }
                normalized.insert(token.to_lowercase(), price);
            }
            networks.insert(network, normalized);
        }

        Ok(Self { networks })
    }

    pub fn has_network(&self, network: &str) -> bool {
        self.networks.contains_key(network)
    }

    /// Read-only view of one network's prices.
    pub fn for_network(&self, network: &str) -> NetworkPrices<'_> {
        NetworkPrices {
            prices: self.networks.get(network),
        }
    }

    #[cfg(test)]
    pub fn insert(&mut self, network: &str, token: Address, price: f64) {
        self.networks
            .entry(network.to_string())
            .or_default()
            .insert(format!("{:#x}", token), price);
    }
}

/// Price lookup bound to the network of the current run.
#[derive(Debug, Clone, Copy)]
pub struct NetworkPrices<'a> {
    prices: Option<&'a HashMap<String, f64>>,
}

impl NetworkPrices<'_> {
    /// `None` means unknown, never zero.
    pub fn price(&self, token: &Address) -> Option<f64> {
        self.prices?.get(&format!("{:#x}", token)).copied()
    }
}
