// src/selector.rs
use crate::gas_policy::{max_gas_price, GasPricePolicyConfig};
use crate::models::{Batch, Flow, PricedFlow};
use crate::price_table::NetworkPrices;
use alloy::primitives::Address;

/// Prices every flow against the policy.
pub fn price_flows(
    flows: &[Flow],
    prices: NetworkPrices<'_>,
    policy: &GasPricePolicyConfig,
) -> Vec<PricedFlow> {
    flows
        .iter()
        .map(|flow| PricedFlow {
            max_gas_price: max_gas_price(flow, prices, policy),
            flow: flow.clone(),
        })
        .collect()
}

/// Keeps flows whose ceiling covers `current_gas_price`, highest ceiling
/// first, and cuts them into consecutive batches of at most `batch_size`.
///
/// All flows must belong to `token`; the caller guarantees it.
pub fn select(
    token: Address,
    priced: Vec<PricedFlow>,
    current_gas_price: u128,
    batch_size: usize,
) -> Vec<Batch> {
    debug_assert!(batch_size > 0, "batch size must be positive");
    debug_assert!(priced.iter().all(|p| p.flow.token == token));

    let mut viable: Vec<PricedFlow> = priced
        .into_iter()
        .filter(|p| p.max_gas_price >= current_gas_price)
        .collect();

    // stable, so equal ceilings keep their input order
    viable.sort_by(|a, b| b.max_gas_price.cmp(&a.max_gas_price));

    viable
        .chunks(batch_size.max(1))
        .map(|chunk| Batch {
            token,
            entries: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgreementKind;
    use alloy::primitives::I256;

    fn token() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn priced(id: u8, ceiling: u128) -> PricedFlow {
        PricedFlow {
            flow: Flow {
                token: token(),
                sender: Address::repeat_byte(id),
                receiver: Address::repeat_byte(0xee),
                agreement: AgreementKind::Cfa,
                flowrate: I256::ONE,
                consumed_deposit_pct: 150.0,
            },
            max_gas_price: ceiling,
        }
    }

    fn sample() -> Vec<PricedFlow> {
        vec![
            priced(1, 500),
            priced(2, 2000),
            priced(3, 900),
            priced(4, 10_000),
            priced(5, 899),
            priced(6, 2000),
            priced(7, 1200),
        ]
    }

    #[test]
    fn filters_sorts_and_chunks() {
        let batches = select(token(), sample(), 900, 2);

        let ceilings: Vec<Vec<u128>> = batches
            .iter()
            .map(|b| b.entries.iter().map(|e| e.max_gas_price).collect())
            .collect();
        assert_eq!(
            ceilings,
            vec![vec![10_000, 2000], vec![2000, 1200], vec![900]]
        );
        assert!(batches.iter().all(|b| b.token == token()));
    }

    #[test]
    fn flattened_order_is_non_increasing_and_above_fee() {
        for fee in [0, 500, 900, 1500, 20_000] {
            for size in 1..5 {
                let batches = select(token(), sample(), fee, size);
                let flat: Vec<u128> = batches
                    .iter()
                    .flat_map(|b| b.entries.iter().map(|e| e.max_gas_price))
                    .collect();
                assert!(flat.windows(2).all(|w| w[0] >= w[1]));
                assert!(flat.iter().all(|c| *c >= fee));
                assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
            }
        }
    }

    #[test]
    fn equal_ceilings_keep_input_order() {
        let batches = select(token(), sample(), 0, 10);
        let senders: Vec<u8> = batches[0]
            .entries
            .iter()
            .map(|e| e.flow.sender.0[0])
            .collect();
        assert_eq!(senders, vec![4, 2, 6, 7, 3, 5, 1]);
    }

    #[test]
    fn nothing_viable_yields_no_batches() {
        assert!(select(token(), sample(), 50_000, 3).is_empty());
        assert!(select(token(), Vec::new(), 0, 3).is_empty());
    }

    #[test]
    fn selection_is_idempotent() {
        let first = select(token(), sample(), 900, 3);
        let second = select(token(), sample(), 900, 3);
        assert_eq!(first, second);
    }
}
