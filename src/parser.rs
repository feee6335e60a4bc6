// src/parser.rs
use crate::models::{AgreementKind, Flow};
use alloy::primitives::{Address, I256};
use serde::Deserialize;
use tracing::warn;

/// Deposit covers this many seconds of outflow past insolvency (4 hours).
pub const LIQUIDATION_PERIOD_SECS: f64 = 14_400.0;

#[derive(Debug, Deserialize, Clone)]
pub struct RawId {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawStream {
    pub receiver: RawId,
    pub current_flow_rate: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawDistributor {
    pub pool: RawId,
    pub flow_rate: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    pub id: String,
    #[serde(default)]
    pub outflows: Vec<RawStream>,
    #[serde(default)]
    pub pool_distributors: Vec<RawDistributor>,
}

/// One `accountTokenSnapshots` row.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    pub id: String,
    pub maybe_critical_at_timestamp: Option<String>,
    pub account: RawAccount,
}

pub fn parse_address(s: &str) -> Option<Address> {
    s.trim().parse::<Address>().ok()
}

/// 100 at the moment of insolvency, +100 per liquidation period after it.
pub fn consumed_deposit_pct(critical_at: i64, now: i64) -> f64 {
    100.0 + (now - critical_at) as f64 / LIQUIDATION_PERIOD_SECS * 100.0
}

/// Decode a snapshot into the flows of its account, if the account is past
/// `threshold`. Malformed entries are logged and skipped.
pub fn decode_snapshot(token: Address, raw: &RawSnapshot, now: i64, threshold: f64) -> Vec<Flow> {
    let Some(critical_at) = raw.maybe_critical_at_timestamp.as_deref() else {
        return Vec::new();
    };
    let Ok(critical_at) = critical_at.parse::<i64>() else {
        warn!("Skipping snapshot {} with bad critical timestamp {}", raw.id, critical_at);
        return Vec::new();
    };
    if critical_at > now {
        return Vec::new();
    }

    let pct = consumed_deposit_pct(critical_at, now);
    if pct <= threshold {
        return Vec::new();
    }

    let Some(sender) = parse_address(&raw.account.id) else {
        warn!("Skipping snapshot {} with bad account id {}", raw.id, raw.account.id);
        return Vec::new();
    };

    let streams = raw
        .account
        .outflows
        .iter()
        .map(|s| (AgreementKind::Cfa, &s.receiver.id, &s.current_flow_rate));
    let distributions = raw
        .account
        .pool_distributors
        .iter()
        .map(|d| (AgreementKind::Gda, &d.pool.id, &d.flow_rate));

    streams
        .chain(distributions)
        .filter_map(|(agreement, receiver_id, rate)| {
            let Some(receiver) = parse_address(receiver_id) else {
                warn!("Skipping flow in snapshot {} with bad receiver {}", raw.id, receiver_id);
                return None;
            };
            let Ok(flowrate) = rate.parse::<I256>() else {
                warn!("Skipping flow in snapshot {} with bad flow rate {}", raw.id, rate);
                return None;
            };
            if flowrate.is_zero() {
                return None;
            }
            Some(Flow {
                token,
                sender,
                receiver,
                agreement,
                flowrate,
                consumed_deposit_pct: pct,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(critical_at: Option<&str>) -> RawSnapshot {
        serde_json::from_value(serde_json::json!({
            "id": "snap-1",
            "maybeCriticalAtTimestamp": critical_at,
            "account": {
                "id": "0x1111111111111111111111111111111111111111",
                "outflows": [
                    { "receiver": { "id": "0x2222222222222222222222222222222222222222" }, "currentFlowRate": "385802469135" },
                    { "receiver": { "id": "not-an-address" }, "currentFlowRate": "1" }
                ],
                "poolDistributors": [
                    { "pool": { "id": "0x3333333333333333333333333333333333333333" }, "flowRate": "1000" },
                    { "pool": { "id": "0x4444444444444444444444444444444444444444" }, "flowRate": "0" }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn percentage_grows_one_hundred_per_period() {
        assert_eq!(consumed_deposit_pct(1_000, 1_000), 100.0);
        assert_eq!(consumed_deposit_pct(0, 14_400), 200.0);
        assert_eq!(consumed_deposit_pct(0, 7_200), 150.0);
    }

    #[test]
    fn decodes_streams_and_distributions() {
        let token = Address::repeat_byte(0xaa);
        let flows = decode_snapshot(token, &snapshot(Some("0")), 14_400, 100.0);

        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].agreement, AgreementKind::Cfa);
        assert_eq!(flows[0].receiver, Address::repeat_byte(0x22));
        assert_eq!(flows[0].flowrate, "385802469135".parse::<I256>().unwrap());
        assert_eq!(flows[1].agreement, AgreementKind::Gda);
        assert_eq!(flows[1].receiver, Address::repeat_byte(0x33));
        assert!(flows.iter().all(|f| f.consumed_deposit_pct == 200.0));
        assert!(flows.iter().all(|f| f.sender == Address::repeat_byte(0x11)));
    }

    #[test]
    fn below_threshold_or_not_critical_yields_nothing() {
        let token = Address::repeat_byte(0xaa);
        assert!(decode_snapshot(token, &snapshot(Some("0")), 14_400, 200.0).is_empty());
        assert!(decode_snapshot(token, &snapshot(Some("20000")), 14_400, 100.0).is_empty());
        assert!(decode_snapshot(token, &snapshot(None), 14_400, 100.0).is_empty());
    }

    #[test]
    fn malformed_flow_rate_skips_only_that_flow() {
        let raw: RawSnapshot = serde_json::from_value(serde_json::json!({
            "id": "snap-2",
            "maybeCriticalAtTimestamp": "0",
            "account": {
                "id": "0x1111111111111111111111111111111111111111",
                "outflows": [
                    { "receiver": { "id": "0x2222222222222222222222222222222222222222" }, "currentFlowRate": "12x" },
                    { "receiver": { "id": "0x5555555555555555555555555555555555555555" }, "currentFlowRate": "42" }
                ]
            }
        }))
        .unwrap();

        let flows = decode_snapshot(Address::repeat_byte(0xaa), &raw, 14_400, 100.0);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].receiver, Address::repeat_byte(0x55));
        assert_eq!(flows[0].flowrate, I256::try_from(42i64).unwrap());
    }

    #[test]
    fn malformed_timestamp_yields_nothing() {
        let token = Address::repeat_byte(0xaa);
        assert!(decode_snapshot(token, &snapshot(Some("soon")), 14_400, 100.0).is_empty());
    }
}
