use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

/// Kind of viewer action carried by a `channel.activities` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityKind {
    Follow,
    Subscription,
    Tip,
    Cheer,
    /// Any activity type without a rate (raids, hosts, merch, ...).
    Other(String),
}

impl ActivityKind {
    /// Map the feed's `type` string onto a kind.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "follow" => Self::Follow,
            "subscriber" => Self::Subscription,
            "tip" => Self::Tip,
            "cheer" => Self::Cheer,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Follow => "follow",
            Self::Subscription => "subscriber",
            Self::Tip => "tip",
            Self::Cheer => "cheer",
            Self::Other(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized activity from the feed.
///
/// `tier` and `amount` are `None` when the feed omitted them or sent something
/// that is not a finite number; the classifier treats both as zero/tier-1.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub username: Option<String>,
    pub tier: Option<u32>,
    pub amount: Option<Decimal>,
}

/// Change to apply to the ledgers for one activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delta {
    pub points: Decimal,
    pub earnings: Decimal,
}

impl Delta {
    pub const ZERO: Self = Self {
        points: Decimal::ZERO,
        earnings: Decimal::ZERO,
    };

    pub fn new(points: Decimal, earnings: Decimal) -> Self {
        Self { points, earnings }
    }

    pub fn is_zero(&self) -> bool {
        self.points.is_zero() && self.earnings.is_zero()
    }
}

/// One JSON line emitted for every activity that moved a ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerUpdate {
    pub timestamp: String,
    pub kind: String,
    pub username: Option<String>,
    pub points_delta: Decimal,
    pub earnings_delta: Decimal,
    /// `None` when the points ledger is disabled.
    pub points_total: Option<Decimal>,
    /// `None` when the earnings ledger is disabled.
    pub earnings_total: Option<Decimal>,
}

/// Counters kept across every session of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTally {
    pub follows: u64,
    pub subscriptions: u64,
    pub tips: u64,
    pub cheers: u64,
    pub other: u64,
    pub responses: u64,
    pub malformed_frames: u64,
}

impl ActivityTally {
    pub fn record(&mut self, kind: &ActivityKind) {
        match kind {
            ActivityKind::Follow => self.follows += 1,
            ActivityKind::Subscription => self.subscriptions += 1,
            ActivityKind::Tip => self.tips += 1,
            ActivityKind::Cheer => self.cheers += 1,
            ActivityKind::Other(_) => self.other += 1,
        }
    }
}

/// Printed once on shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct ExitSummary {
    pub points_total: Option<Decimal>,
    pub earnings_total: Option<Decimal>,
    pub currency_symbol: String,
    pub sessions_opened: u64,
    pub activities: ActivityTally,
}

/// Parse a decimal the way the feed and environment hand numbers over:
/// plain (`"12.5"`) or scientific (`"1e3"`). Blank input yields `None`.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wire_kinds_map_to_variants() {
        assert_eq!(ActivityKind::from_wire("follow"), ActivityKind::Follow);
        assert_eq!(ActivityKind::from_wire("subscriber"), ActivityKind::Subscription);
        assert_eq!(ActivityKind::from_wire("tip"), ActivityKind::Tip);
        assert_eq!(ActivityKind::from_wire("cheer"), ActivityKind::Cheer);
        assert_eq!(
            ActivityKind::from_wire("raid"),
            ActivityKind::Other("raid".to_string())
        );
        assert_eq!(ActivityKind::Subscription.to_string(), "subscriber");
    }

    #[test]
    fn parse_decimal_accepts_plain_and_scientific() {
        assert_eq!(parse_decimal("12.5"), Some(dec!(12.5)));
        assert_eq!(parse_decimal(" -3 "), Some(dec!(-3)));
        assert_eq!(parse_decimal("1e3"), Some(dec!(1000)));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn tally_counts_per_kind() {
        let mut tally = ActivityTally::default();
        tally.record(&ActivityKind::Follow);
        tally.record(&ActivityKind::Follow);
        tally.record(&ActivityKind::Other("raid".into()));
        assert_eq!(tally.follows, 2);
        assert_eq!(tally.other, 1);
        assert_eq!(tally.cheers, 0);
    }

    #[test]
    fn zero_delta() {
        assert!(Delta::ZERO.is_zero());
        assert!(!Delta::new(dec!(0), dec!(0.01)).is_zero());
    }
}
