//! Machine-readable output on stdout; logs stay on stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::types::{ExitSummary, LedgerUpdate};

/// One compact JSON line per ledger update.
pub fn render_update(update: &LedgerUpdate) -> Result<String> {
    serde_json::to_string(update).context("failed to serialize ledger update")
}

/// Pretty JSON for the shutdown report.
pub fn render_exit_summary(summary: &ExitSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize exit summary")
}

pub fn report_update(update: &LedgerUpdate) {
    emit(render_update(update));
}

pub fn report_exit_summary(summary: &ExitSummary) {
    emit(render_exit_summary(summary));
}

fn emit(rendered: Result<String>) {
    match rendered {
        Ok(text) => println!("{text}"),
        Err(e) => warn!("Report skipped: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityTally;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    #[test]
    fn update_is_a_single_json_line() {
        let update = LedgerUpdate {
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            kind: "tip".to_string(),
            username: Some("d".to_string()),
            points_delta: dec!(120),
            earnings_delta: dec!(0),
            points_total: Some(dec!(1120)),
            earnings_total: None,
        };
        let line = render_update(&update).unwrap();
        assert!(!line.contains('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "tip");
        assert_eq!(value["username"], "d");
        assert!(value["earnings_total"].is_null());
    }

    #[test]
    fn exit_summary_includes_tally() {
        let activities = ActivityTally {
            follows: 2,
            ..ActivityTally::default()
        };
        let summary = ExitSummary {
            points_total: Some(dec!(20)),
            earnings_total: None,
            currency_symbol: "$".to_string(),
            sessions_opened: 1,
            activities,
        };
        let value: Value = serde_json::from_str(&render_exit_summary(&summary).unwrap()).unwrap();
        assert_eq!(value["sessions_opened"], 1);
        assert_eq!(value["activities"]["follows"], 2);
    }
}
