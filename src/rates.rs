use rust_decimal::Decimal;

use crate::config::RateConfig;

/// Subscription tier codes as sent by the feed.
pub const TIER_ONE: u32 = 1000;
pub const TIER_TWO: u32 = 2000;
pub const TIER_THREE: u32 = 3000;

/// Points and earnings awarded per unit of an activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rate {
    pub points: Decimal,
    pub earnings: Decimal,
}

/// Per-activity rates, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    pub follow: Rate,
    pub tier_one_sub: Rate,
    pub tier_two_sub: Rate,
    pub tier_three_sub: Rate,
    /// Per one USD tipped.
    pub tip_usd: Rate,
    /// Per whole hundred bits cheered.
    pub hundred_bits: Rate,
}

impl RateTable {
    /// Pair the points and earnings sections of the config into one table.
    pub fn new(points: &RateConfig, earnings: &RateConfig) -> Self {
        let pair = |p: Decimal, e: Decimal| Rate {
            points: p,
            earnings: e,
        };
        Self {
            follow: pair(points.follow, earnings.follow),
            tier_one_sub: pair(points.tier_one_sub, earnings.tier_one_sub),
            tier_two_sub: pair(points.tier_two_sub, earnings.tier_two_sub),
            tier_three_sub: pair(points.tier_three_sub, earnings.tier_three_sub),
            tip_usd: pair(points.one_usd_tip, earnings.one_usd_tip),
            hundred_bits: pair(points.one_hundred_bits, earnings.one_hundred_bits),
        }
    }

    /// Rate for a subscription tier code. Unknown or missing tiers pay the tier-1 rate.
    pub fn subscription(&self, tier: Option<u32>) -> Rate {
        match tier {
            Some(TIER_TWO) => self.tier_two_sub,
            Some(TIER_THREE) => self.tier_three_sub,
            // TIER_ONE, unrecognized codes ("prime", 9999) and missing tiers
            _ => self.tier_one_sub,
        }
    }
}

impl Default for RateTable {
    fn default() -> Self {
        let defaults = RateConfig::default();
        Self::new(&defaults, &defaults)
    }
}
