// src/gas_policy.rs
use crate::error::{Error, Result};
use crate::models::Flow;
use crate::price_table::NetworkPrices;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Normalized daily value of a flow worth exactly 1 USD/day (18 decimals).
pub const REFERENCE_NORMALIZED_DAILY_VALUE: f64 = 1e18;

/// Hours of insolvency per 100% of deposit consumed beyond 100%.
pub const HOURS_PER_100_PCT: f64 = 4.0;

/// The decay multiplier stops growing after this many days.
pub const MAX_INSOLVENT_DAYS: f64 = 10.0;

/// Immutable gas price ceilings, all in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPricePolicyConfig {
    reference: u128,
    fallback: u128,
    min: u128,
}

impl GasPricePolicyConfig {
    /// Unset limits default to 10x (fallback) and 0.1x (min) of the reference.
    pub fn new(reference: u128, fallback: Option<u128>, min: Option<u128>) -> Result<Self> {
        let fallback = fallback.unwrap_or_else(|| reference.saturating_mul(10));
        let min = min.unwrap_or(reference / 10);

        if min > fallback {
            return Err(Error::Config(format!(
                "min gas price limit {} exceeds fallback limit {}",
                min, fallback
            )));
        }
        if min > reference {
            return Err(Error::Config(format!(
                "min gas price limit {} exceeds reference limit {}",
                min, reference
            )));
        }

        Ok(Self {
            reference,
            fallback,
            min,
        })
    }

    pub fn reference(&self) -> u128 {
        self.reference
    }

    pub fn fallback(&self) -> u128 {
        self.fallback
    }

    pub fn min(&self) -> u128 {
        self.min
    }
}

/// Urgency multiplier: 1 until insolvent, then +1 per day insolvent, capped at 11.
pub fn time_decay_multiplier(consumed_deposit_pct: f64) -> f64 {
    if consumed_deposit_pct.is_nan() || consumed_deposit_pct <= 100.0 {
        return 1.0;
    }
    let hours_insolvent = (consumed_deposit_pct - 100.0) * HOURS_PER_100_PCT / 100.0;
    let days_insolvent = hours_insolvent / 24.0;
    1.0 + days_insolvent.min(MAX_INSOLVENT_DAYS)
}

/// Ceiling before the time-decay multiplier is applied.
pub fn base_ceiling(flow: &Flow, price: Option<f64>, config: &GasPricePolicyConfig) -> u128 {
    let Some(price) = price else {
        return config.fallback;
    };

    let flowrate = flow.flowrate.unsigned_abs().saturating_to::<u128>() as f64;
    let normalized_daily_value = (flowrate * SECONDS_PER_DAY * price).round();
    let scaled = (normalized_daily_value * config.reference as f64
        / REFERENCE_NORMALIZED_DAILY_VALUE)
        .round();

    // `as` saturates on overflow and maps NaN to 0
    (scaled as u128).max(config.min)
}

/// Highest gas price worth paying to liquidate `flow`.
pub fn max_gas_price(
    flow: &Flow,
    prices: NetworkPrices<'_>,
    config: &GasPricePolicyConfig,
) -> u128 {
    let base = base_ceiling(flow, prices.price(&flow.token), config);
    (base as f64 * time_decay_multiplier(flow.consumed_deposit_pct)).round() as u128
}
