use crate::error::Error;
use crate::gas_policy::GasPricePolicyConfig;
use alloy::primitives::{address, Address};
use alloy::signers::local::PrivateKeySigner;
use dotenvy::dotenv;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::{env, time::Duration};
use tracing::info;

pub const DEFAULT_CFA_FORWARDER: Address = address!("cfa132e353cb4e398080b9700609bb008eceb125");

/// Everything a run needs, built once at startup and passed down explicitly.
#[derive(Clone)]
pub struct Config {
    pub rpc_http_url: String,
    pub subgraph_url: String,
    pub network: String,
    pub price_table_path: String,
    pub batch_contract: Address,
    pub cfa_forwarder: Address,
    /// Single-token mode when set.
    pub token: Option<Address>,
    pub listed_only: bool,
    pub policy: GasPricePolicyConfig,
    pub gas_limit_multiplier: f64,
    pub batch_size: usize,
    pub deposit_consumed_pct_threshold: f64,
    pub dry_run: bool,
    /// Loop mode when set, one-shot otherwise.
    pub loop_interval: Option<Duration>,
    pub confirmation_timeout: Duration,
    pub signer: Option<PrivateKeySigner>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("rpc_http_url", &self.rpc_http_url)
            .field("subgraph_url", &self.subgraph_url)
            .field("network", &self.network)
            .field("price_table_path", &self.price_table_path)
            .field("batch_contract", &self.batch_contract)
            .field("cfa_forwarder", &self.cfa_forwarder)
            .field("token", &self.token)
            .field("listed_only", &self.listed_only)
            .field("policy", &self.policy)
            .field("gas_limit_multiplier", &self.gas_limit_multiplier)
            .field("batch_size", &self.batch_size)
            .field("deposit_consumed_pct_threshold", &self.deposit_consumed_pct_threshold)
            .field("dry_run", &self.dry_run)
            .field("loop_interval", &self.loop_interval)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .finish()
    }
}

impl Config {
    /// Address that pays for liquidations; zero in key-less dry-run mode.
    pub fn sender(&self) -> Address {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .unwrap_or(Address::ZERO)
    }
}

/// Typed access over a key lookup; the process environment in production.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.raw(key)
            .ok_or_else(|| eyre!(Error::Config(format!("{} is not set", key))))
    }

    fn optional<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(v) => v
                .parse::<T>()
                .map(Some)
                .map_err(|e| eyre!(Error::Config(format!("invalid {}={}: {}", key, v, e)))),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.optional::<bool>(key)?.unwrap_or(default))
    }
}

/// Reads `.env` and the process environment.
pub fn load() -> Result<Config> {
    dotenv().ok();
    load_from(|key| env::var(key).ok())
}

/// Like `load`, for tools that never sign: `DRY_RUN` is forced on so no
/// `PRIVATE_KEY` is needed.
pub fn load_read_only() -> Result<Config> {
    dotenv().ok();
    load_from(dry_run_forced(|key| env::var(key).ok()))
}

fn dry_run_forced<F>(lookup: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |key: &str| {
        if key == "DRY_RUN" {
            Some("true".to_string())
        } else {
            lookup(key)
        }
    }
}

pub fn load_from<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Config> {
    let vars = Vars(lookup);

    let rpc_http_url = vars.required("RPC_HTTP_URL")?;
    let subgraph_url = vars.required("SUBGRAPH_URL")?;
    let network = vars.required("NETWORK")?;

    let price_table_path = vars
        .raw("PRICE_TABLE_PATH")
        .unwrap_or_else(|| "token_prices.json".to_string());

    let batch_contract: Address = vars
        .required("BATCH_CONTRACT")?
        .parse()
        .map_err(|e| eyre!(Error::Config(format!("invalid BATCH_CONTRACT: {}", e))))?;

    let cfa_forwarder = vars
        .optional::<Address>("CFA_FORWARDER")?
        .unwrap_or(DEFAULT_CFA_FORWARDER);
    let token = vars.optional::<Address>("TOKEN")?;
    let listed_only = vars.flag("LISTED_ONLY", true)?;

    let reference = vars
        .optional::<u128>("REFERENCE_GAS_PRICE_LIMIT")?
        .unwrap_or(1_000_000_000);
    let policy = GasPricePolicyConfig::new(
        reference,
        vars.optional("FALLBACK_GAS_PRICE_LIMIT")?,
        vars.optional("MIN_GAS_PRICE_LIMIT")?,
    )?;

    let gas_limit_multiplier = vars.optional::<f64>("GAS_LIMIT_MULTIPLIER")?.unwrap_or(1.2);
    if !(gas_limit_multiplier.is_finite() && gas_limit_multiplier > 1.0) {
        return Err(eyre!(Error::Config(format!(
            "GAS_LIMIT_MULTIPLIER must be > 1.0, got {}",
            gas_limit_multiplier
        ))));
    }

    let batch_size = vars.optional::<usize>("BATCH_SIZE")?.unwrap_or(10);
    if batch_size == 0 {
        return Err(eyre!(Error::Config("BATCH_SIZE must be at least 1".into())));
    }

    let deposit_consumed_pct_threshold = vars
        .optional::<f64>("DEPOSIT_CONSUMED_PCT_THRESHOLD")?
        .unwrap_or(100.0);
    let dry_run = vars.flag("DRY_RUN", false)?;
    let loop_interval = vars
        .optional::<u64>("LOOP_INTERVAL_SECS")?
        .map(Duration::from_secs);
    let confirmation_timeout =
        Duration::from_secs(vars.optional::<u64>("CONFIRMATION_TIMEOUT_SECS")?.unwrap_or(120));

    let signer = match vars.raw("PRIVATE_KEY") {
        Some(key) => Some(
            key.trim_start_matches("0x")
                .parse::<PrivateKeySigner>()
                .map_err(|e| eyre!(Error::Config(format!("invalid PRIVATE_KEY: {}", e))))?,
        ),
        None if dry_run => None,
        None => {
            return Err(eyre!(Error::Config(
                "PRIVATE_KEY is required unless DRY_RUN=true".into()
            )))
        }
    };

    let cfg = Config {
        rpc_http_url,
        subgraph_url,
        network,
        price_table_path,
        batch_contract,
        cfa_forwarder,
        token,
        listed_only,
        policy,
        gas_limit_multiplier,
        batch_size,
        deposit_consumed_pct_threshold,
        dry_run,
        loop_interval,
        confirmation_timeout,
        signer,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn base() -> HashMap<&'static str, String> {
        HashMap::from([
            ("RPC_HTTP_URL", "http://localhost:8545".to_string()),
            ("SUBGRAPH_URL", "http://localhost:8000/subgraphs/name/protocol".to_string()),
            ("NETWORK", "polygon-mainnet".to_string()),
            ("BATCH_CONTRACT", "0x00000000000000000000000000000000000000bb".to_string()),
            ("PRIVATE_KEY", KEY.to_string()),
        ])
    }

    fn load_with(vars: &HashMap<&'static str, String>) -> Result<Config> {
        load_from(|key| vars.get(key).cloned())
    }

    fn assert_config_error(res: Result<Config>) {
        let err = res.expect_err("config should be rejected");
        assert!(
            matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn defaults_apply() {
        let cfg = load_with(&base()).unwrap();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.gas_limit_multiplier, 1.2);
        assert_eq!(cfg.cfa_forwarder, DEFAULT_CFA_FORWARDER);
        assert_eq!(cfg.policy.reference(), 1_000_000_000);
        assert_eq!(cfg.price_table_path, "token_prices.json");
        assert!(cfg.listed_only);
        assert!(!cfg.dry_run);
        assert!(cfg.token.is_none());
        assert!(cfg.loop_interval.is_none());
        assert_ne!(cfg.sender(), Address::ZERO);
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let mut vars = base();
        vars.insert("BATCH_SIZE", " 25 ".into());
        vars.insert("LOOP_INTERVAL_SECS", "60".into());
        vars.insert("TOKEN", "0x00000000000000000000000000000000000000aa".into());
        let cfg = load_with(&vars).unwrap();
        assert_eq!(cfg.batch_size, 25);
        assert_eq!(cfg.loop_interval, Some(Duration::from_secs(60)));
        assert_eq!(cfg.token, Some(Address::with_last_byte(0xaa)));
    }

    #[test]
    fn missing_required_value_is_fatal() {
        let mut vars = base();
        vars.insert("RPC_HTTP_URL", "   ".into());
        assert_config_error(load_with(&vars));
    }

    #[test]
    fn gas_limit_multiplier_must_exceed_one() {
        for bad in ["1.0", "0.5", "NaN"] {
            let mut vars = base();
            vars.insert("GAS_LIMIT_MULTIPLIER", bad.into());
            assert_config_error(load_with(&vars));
        }
    }

    #[test]
    fn zero_batch_size_is_fatal() {
        let mut vars = base();
        vars.insert("BATCH_SIZE", "0".into());
        assert_config_error(load_with(&vars));
    }

    #[test]
    fn live_mode_requires_private_key() {
        let mut vars = base();
        vars.remove("PRIVATE_KEY");
        assert_config_error(load_with(&vars));

        vars.insert("DRY_RUN", "true".into());
        let cfg = load_with(&vars).unwrap();
        assert!(cfg.signer.is_none());
        assert_eq!(cfg.sender(), Address::ZERO);
    }

    #[test]
    fn malformed_private_key_is_fatal() {
        let mut vars = base();
        vars.insert("PRIVATE_KEY", "0x1234".into());
        assert_config_error(load_with(&vars));
    }

    #[test]
    fn invalid_addresses_are_fatal() {
        for key in ["BATCH_CONTRACT", "CFA_FORWARDER", "TOKEN"] {
            let mut vars = base();
            vars.insert(key, "0x123".into());
            assert_config_error(load_with(&vars));
        }
    }

    #[test]
    fn policy_ordering_is_checked() {
        let mut vars = base();
        vars.insert("REFERENCE_GAS_PRICE_LIMIT", "1000".into());
        vars.insert("FALLBACK_GAS_PRICE_LIMIT", "500".into());
        vars.insert("MIN_GAS_PRICE_LIMIT", "800".into());
        assert_config_error(load_with(&vars));

        vars.insert("MIN_GAS_PRICE_LIMIT", "2000".into());
        vars.insert("FALLBACK_GAS_PRICE_LIMIT", "5000".into());
        assert_config_error(load_with(&vars));
    }

    #[test]
    fn bad_flag_is_fatal() {
        let mut vars = base();
        vars.insert("DRY_RUN", "yes".into());
        assert_config_error(load_with(&vars));
    }

    #[test]
    fn read_only_loading_needs_no_key() {
        let mut vars = base();
        vars.remove("PRIVATE_KEY");
        vars.insert("DRY_RUN", "false".into());
        let cfg = load_from(dry_run_forced(|key| vars.get(key).cloned())).unwrap();
        assert!(cfg.dry_run);
        assert!(cfg.signer.is_none());
    }
}
