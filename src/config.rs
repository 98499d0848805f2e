use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::ASTRO_WS_URL;
use crate::types::parse_decimal;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
///
/// Every section is optional; environment variables (see [`AppConfig::apply_env`])
/// take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub points: RateConfig,
    #[serde(default)]
    pub earnings: RateConfig,
}

/// Channel credential.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccountConfig {
    /// Externally obtained JWT for the activity feed.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Fixed wait between a closed session and the next connect attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_url() -> String {
    ASTRO_WS_URL.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Which ledgers are kept, where, and how they stay consistent with disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_true")]
    pub use_points: bool,
    #[serde(default)]
    pub use_earnings: bool,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Re-read the ledger file before every mutation.
    #[serde(default = "default_true")]
    pub always_resync: bool,
    #[serde(default = "default_points_file")]
    pub points_file: PathBuf,
    #[serde(default = "default_earnings_file")]
    pub earnings_file: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_points_file() -> PathBuf {
    PathBuf::from("points.txt")
}

fn default_earnings_file() -> PathBuf {
    PathBuf::from("earnings.txt")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            use_points: true,
            use_earnings: false,
            currency_symbol: default_currency_symbol(),
            always_resync: true,
            points_file: default_points_file(),
            earnings_file: default_earnings_file(),
        }
    }
}

/// Per-activity rates for one ledger. The `[points]` and `[earnings]`
/// sections share this shape and the same defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    pub follow: Decimal,
    pub tier_one_sub: Decimal,
    pub tier_two_sub: Decimal,
    pub tier_three_sub: Decimal,
    pub one_usd_tip: Decimal,
    pub one_hundred_bits: Decimal,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            follow: dec!(10),
            tier_one_sub: dec!(150),
            tier_two_sub: dec!(300),
            tier_three_sub: dec!(750),
            one_usd_tip: dec!(60),
            one_hundred_bits: dec!(30),
        }
    }
}

impl RateConfig {
    /// Override rates from `<PREFIX>_PER_*` variables, keeping the current
    /// value when a variable is unset, blank or not a number.
    fn apply_env(&mut self, prefix: &str, lookup: &impl Fn(&str) -> Option<String>) {
        let fields: [(&str, &mut Decimal); 6] = [
            ("FOLLOW", &mut self.follow),
            ("TIER_ONE_SUB", &mut self.tier_one_sub),
            ("TIER_TWO_SUB", &mut self.tier_two_sub),
            ("TIER_THREE_SUB", &mut self.tier_three_sub),
            ("ONE_USD_DONO", &mut self.one_usd_tip),
            ("ONE_HUNDRED_BITS", &mut self.one_hundred_bits),
        ];
        for (suffix, slot) in fields {
            let key = format!("{prefix}_PER_{suffix}");
            if let Some(value) = lookup(&key).as_deref().and_then(parse_decimal) {
                *slot = value;
            }
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load config if the file exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Layer environment variables over the file values.
    ///
    /// `lookup` is `std::env::var` in the binary; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("JWT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.account.token = Some(token);
        }
        if let Some(raw) = lookup("ALWAYS_READ_IN_POINTS_TXT") {
            self.ledger.always_resync = raw != "false";
        }
        if let Some(raw) = lookup("USE_POINTS") {
            self.ledger.use_points = raw != "false";
        }
        if let Some(raw) = lookup("USE_CURRENCY") {
            self.ledger.use_earnings = raw == "true";
        }
        if let Some(symbol) = lookup("CURRENCY_SYMBOL").filter(|s| !s.is_empty()) {
            self.ledger.currency_symbol = symbol;
        }
        if let Some(delay) = lookup("RECONNECT_DELAY_MS").and_then(|raw| raw.trim().parse::<u64>().ok()) {
            self.connection.reconnect_delay_ms = delay;
        }
        self.points.apply_env("POINTS", &lookup);
        self.earnings.apply_env("EARNINGS", &lookup);
    }

    /// The credential, or an error explaining where to set it.
    pub fn token(&self) -> Result<&str> {
        self.account
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("no channel token: set JWT_TOKEN or [account] token in config.toml")
    }
}
