use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;
use serde_json::Value;
use tracing::warn;

use crate::rates::{Rate, RateTable};
use crate::types::{ActivityEvent, ActivityKind, Delta, parse_decimal};

/// Bits are only rewarded in whole hundreds.
const BITS_PER_UNIT: Decimal = dec!(100);

/// Compute the ledger change for one activity.
///
/// Missing amounts count as zero. Unrecognized activity kinds yield
/// [`Delta::ZERO`]; the caller decides whether to log them.
pub fn classify(event: &ActivityEvent, rates: &RateTable) -> Delta {
    let amount = event.amount.unwrap_or(Decimal::ZERO);
    match &event.kind {
        // One follow is one follow, whatever the amount field says.
        ActivityKind::Follow => scaled(rates.follow, Decimal::ONE),
        ActivityKind::Subscription => scaled(rates.subscription(event.tier), amount),
        ActivityKind::Tip => scaled(rates.tip_usd, amount),
        ActivityKind::Cheer => {
            let hundreds = (amount / BITS_PER_UNIT).floor();
            scaled(rates.hundred_bits, hundreds)
        }
        ActivityKind::Other(_) => Delta::ZERO,
    }
}

/// `rate * units`, or nothing at all when either product overflows.
fn scaled(rate: Rate, units: Decimal) -> Delta {
    match (rate.points.checked_mul(units), rate.earnings.checked_mul(units)) {
        (Some(points), Some(earnings)) => Delta::new(points, earnings),
        _ => {
            warn!("Activity amount {units} is out of range for the configured rates; ignoring");
            Delta::ZERO
        }
    }
}

/// Interpret a JSON field as a finite number.
///
/// Numbers and numeric strings are accepted; `null`, booleans, objects and
/// anything that does not parse come back as `None`.
pub fn numeric_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Interpret a JSON field as a subscription tier code (`1000`, `"2000"`, ...).
///
/// Non-numeric tiers such as `"prime"` come back as `None`.
pub fn tier_code(value: &Value) -> Option<u32> {
    numeric_value(value)
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_u32())
}
