use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{error, info};

use crate::config::LedgerConfig;
use crate::types::Delta;

/// One file-backed counter (points or earnings).
///
/// The file holds the formatted value, optionally followed by a currency
/// suffix, and nothing else. `value` mirrors the file as of the last
/// completed read or write.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    name: &'static str,
    path: PathBuf,
    suffix: String,
    value: Decimal,
}

impl LedgerEntry {
    pub fn points(path: PathBuf) -> Self {
        Self {
            name: "points",
            path,
            suffix: String::new(),
            value: Decimal::ZERO,
        }
    }

    pub fn earnings(path: PathBuf, currency_symbol: &str) -> Self {
        Self {
            name: "earnings",
            path,
            suffix: currency_symbol.to_string(),
            value: Decimal::ZERO,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// In-memory value; may lag the file when resync is off.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Formatted value with suffix, exactly as it is written to disk.
    pub fn display(&self) -> String {
        format!("{}{}", format_value(self.value), self.suffix)
    }

    /// Read the stored value, creating the file with zero when absent.
    ///
    /// Storage errors are logged and read as zero.
    pub fn read(&self) -> Decimal {
        match self.try_read() {
            Ok(value) => value,
            Err(e) => {
                error!("Error reading {} file {}: {e:#}", self.name, self.path.display());
                Decimal::ZERO
            }
        }
    }

    fn try_read(&self) -> Result<Decimal> {
        if !self.path.exists() {
            self.write_value(Decimal::ZERO)?;
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(normalize_stored(&raw))
    }

    /// Refresh the in-memory value from disk.
    pub fn load(&mut self) -> Decimal {
        self.value = self.read();
        self.value
    }

    /// Add `delta` and overwrite the file with the new total.
    ///
    /// A zero delta does nothing at all. With `resync` the file is re-read
    /// first so external edits are not lost. A failed write is logged and
    /// dropped, leaving the in-memory value at what the file last held.
    /// Returns the new total when it was written.
    pub fn apply(&mut self, delta: Decimal, resync: bool) -> Option<Decimal> {
        if delta.is_zero() {
            return None;
        }
        if resync {
            self.load();
        }
        let existing = self.value;
        info!("Updating {}… existing: {}", self.name, self.display());

        let Some(updated) = existing.checked_add(delta) else {
            error!(
                "{} total {} cannot absorb {}; update dropped",
                self.name,
                self.display(),
                delta_label(delta)
            );
            return None;
        };
        if let Err(e) = self.write_value(updated) {
            error!("Error writing {} file {}: {e:#}", self.name, self.path.display());
            return None;
        }
        self.value = updated;
        info!(
            "{} updated ({}) | current: {}",
            self.name,
            delta_label(delta),
            self.display()
        );
        Some(updated)
    }

    fn write_value(&self, value: Decimal) -> Result<()> {
        let payload = format!("{}{}", format_value(value), self.suffix);
        std::fs::write(&self.path, payload)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// The points ledger and the optional earnings ledger.
#[derive(Debug)]
pub struct LedgerStore {
    points: Option<LedgerEntry>,
    earnings: Option<LedgerEntry>,
    always_resync: bool,
}

impl LedgerStore {
    /// Build the enabled ledgers under `data_dir` and load their current values.
    pub fn open(config: &LedgerConfig, data_dir: &Path) -> Self {
        let points = config
            .use_points
            .then(|| LedgerEntry::points(data_dir.join(&config.points_file)));
        let earnings = config.use_earnings.then(|| {
            LedgerEntry::earnings(data_dir.join(&config.earnings_file), &config.currency_symbol)
        });
        let mut store = Self {
            points,
            earnings,
            always_resync: config.always_resync,
        };
        for entry in store.entries_mut() {
            entry.load();
        }
        store
    }

    fn entries_mut(&mut self) -> impl Iterator<Item = &mut LedgerEntry> {
        self.points.iter_mut().chain(self.earnings.iter_mut())
    }

    pub fn points(&self) -> Option<&LedgerEntry> {
        self.points.as_ref()
    }

    pub fn earnings(&self) -> Option<&LedgerEntry> {
        self.earnings.as_ref()
    }

    pub fn points_total(&self) -> Option<Decimal> {
        self.points.as_ref().map(LedgerEntry::value)
    }

    pub fn earnings_total(&self) -> Option<Decimal> {
        self.earnings.as_ref().map(LedgerEntry::value)
    }

    /// Apply a delta to every enabled ledger. Returns true if any file changed.
    pub fn apply(&mut self, delta: Delta) -> bool {
        let resync = self.always_resync;
        let mut changed = false;
        if let Some(points) = self.points.as_mut() {
            changed |= points.apply(delta.points, resync).is_some();
        }
        if let Some(earnings) = self.earnings.as_mut() {
            changed |= earnings.apply(delta.earnings, resync).is_some();
        }
        changed
    }
}

/// Render a value with two fraction digits and `,` thousands grouping.
pub fn format_value(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let digits = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{frac_part}")
}

/// Parse stored text, keeping only digits, `.` and `-`. Garbage reads as zero.
///
/// Only the leading number of what remains counts, so a suffix such as
/// `kr.` or trailing notes never spoil the value.
pub fn normalize_stored(raw: &str) -> Decimal {
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    leading_number(&sanitized)
        .and_then(|number| number.parse().ok())
        .unwrap_or(Decimal::ZERO)
}

/// The longest `-?digits[.digits]` prefix of `text`, if it holds any digit.
fn leading_number(text: &str) -> Option<String> {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (int_part, tail) = rest.split_at(int_len);
    let frac_part = tail
        .strip_prefix('.')
        .map(|frac| {
            let len = frac.find(|c: char| !c.is_ascii_digit()).unwrap_or(frac.len());
            &frac[..len]
        })
        .unwrap_or("");

    match (int_part.is_empty(), frac_part.is_empty()) {
        (true, true) => None,
        (_, true) => Some(format!("{sign}{int_part}")),
        (true, false) => Some(format!("{sign}0.{frac_part}")),
        (false, false) => Some(format!("{sign}{int_part}.{frac_part}")),
    }
}

/// Signed delta for log lines, e.g. `+150.00` or `-5.00`.
pub fn delta_label(delta: Decimal) -> String {
    let sign = if delta.is_sign_negative() { "-" } else { "+" };
    format!("{sign}{}", format_value(delta.abs()))
}
