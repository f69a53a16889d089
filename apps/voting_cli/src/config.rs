use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use shared::domain::{Address, Wei};
use url::Url;
use voting_client::{ProbeStrategy, RpcSettings, SyncSettings, DEFAULT_PROBE_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub contract_address: String,
    pub chain_id: Option<u64>,
    pub sender: Option<String>,
    pub explorer_tx_url: String,
    pub probe_limit: usize,
    pub probe_window: usize,
    pub fund_amount_wei: u128,
    pub receipt_poll_interval_ms: u64,
    pub confirmation_timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".into(),
            contract_address: "0xddb46ef53eEB95b755CC1F43558e78AeC308C117".into(),
            chain_id: Some(11_155_111),
            sender: None,
            explorer_tx_url: "https://sepolia.etherscan.io/tx/".into(),
            probe_limit: DEFAULT_PROBE_LIMIT,
            probe_window: 1,
            fund_amount_wei: Wei::DEFAULT_FUNDING.0,
            receipt_poll_interval_ms: 2_000,
            confirmation_timeout_seconds: 180,
            poll_interval_seconds: 12,
        }
    }
}

impl Settings {
    pub fn rpc_settings(&self) -> Result<RpcSettings> {
        let rpc_url = Url::parse(self.rpc_url.trim())
            .with_context(|| format!("invalid rpc url '{}'", self.rpc_url))?;
        let contract: Address = self
            .contract_address
            .parse()
            .with_context(|| format!("invalid contract address '{}'", self.contract_address))?;
        let sender = self
            .sender
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
            .context("invalid sender address")?;

        let mut settings = RpcSettings::new(rpc_url, contract);
        settings.sender = sender;
        settings.receipt_poll_interval = Duration::from_millis(self.receipt_poll_interval_ms);
        settings.confirmation_timeout = Duration::from_secs(self.confirmation_timeout_seconds);
        Ok(settings)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let probe_strategy = if self.probe_window > 1 {
            ProbeStrategy::Windowed {
                width: self.probe_window,
            }
        } else {
            ProbeStrategy::Sequential
        };
        SyncSettings {
            probe_limit: self.probe_limit,
            probe_strategy,
            funding_amount: Wei(self.fund_amount_wei),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// Applies a flat `key = "value"` table; unknown keys and unparsable values are ignored.
pub(crate) fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    for (key, value) in file_cfg {
        let value = match value {
            toml::Value::String(text) => text,
            other => other.to_string(),
        };
        apply_key(settings, &key, value);
    }
}

pub(crate) fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    const ALIASES: &[(&str, &str)] = &[
        ("VOTING_RPC_URL", "rpc_url"),
        ("APP__RPC_URL", "rpc_url"),
        ("VOTING_CONTRACT_ADDRESS", "contract_address"),
        ("APP__CONTRACT_ADDRESS", "contract_address"),
        ("VOTING_SENDER", "sender"),
        ("APP__SENDER", "sender"),
        ("APP__CHAIN_ID", "chain_id"),
        ("APP__EXPLORER_TX_URL", "explorer_tx_url"),
        ("APP__PROBE_LIMIT", "probe_limit"),
        ("APP__PROBE_WINDOW", "probe_window"),
        ("APP__FUND_AMOUNT_WEI", "fund_amount_wei"),
        ("APP__RECEIPT_POLL_INTERVAL_MS", "receipt_poll_interval_ms"),
        ("APP__CONFIRMATION_TIMEOUT_SECONDS", "confirmation_timeout_seconds"),
        ("APP__POLL_INTERVAL_SECONDS", "poll_interval_seconds"),
    ];
    for (var, key) in ALIASES {
        if let Some(value) = lookup(var) {
            apply_key(settings, key, value);
        }
    }
}

fn apply_key(settings: &mut Settings, key: &str, value: String) {
    match key {
        "rpc_url" => settings.rpc_url = value,
        "contract_address" => settings.contract_address = value,
        "sender" => settings.sender = Some(value).filter(|v| !v.trim().is_empty()),
        "chain_id" => {
            if let Ok(parsed) = value.parse() {
                settings.chain_id = Some(parsed);
            }
        }
        "explorer_tx_url" => settings.explorer_tx_url = value,
        "probe_limit" => set_parsed(&mut settings.probe_limit, &value),
        "probe_window" => set_parsed(&mut settings.probe_window, &value),
        "fund_amount_wei" => set_parsed(&mut settings.fund_amount_wei, &value),
        "receipt_poll_interval_ms" => set_parsed(&mut settings.receipt_poll_interval_ms, &value),
        "confirmation_timeout_seconds" => {
            set_parsed(&mut settings.confirmation_timeout_seconds, &value)
        }
        "poll_interval_seconds" => set_parsed(&mut settings.poll_interval_seconds, &value),
        _ => {}
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(parsed) = value.trim().parse() {
        *slot = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
