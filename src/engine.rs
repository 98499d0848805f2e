use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::classify;
use crate::ledger::LedgerStore;
use crate::protocol::{self, Inbound};
use crate::rates::RateTable;
use crate::types::{ActivityEvent, ActivityKind, ActivityTally, Delta, ExitSummary, LedgerUpdate};

/// What became of one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Subscribe/unsubscribe acknowledgement, logged only.
    Response,
    /// Frame for another topic or envelope type.
    Ignored,
    /// Frame that could not be decoded; the session carries on.
    Malformed,
    /// An activity was classified. `update` is set when a ledger changed.
    Activity {
        delta: Delta,
        update: Option<LedgerUpdate>,
    },
}

/// Turns inbound frames into ledger mutations.
///
/// Owns the ledgers for the whole process; sessions come and go around it.
pub struct ActivityEngine {
    rates: Arc<RateTable>,
    ledger: LedgerStore,
    tally: ActivityTally,
    currency_symbol: String,
}

impl ActivityEngine {
    pub fn new(rates: Arc<RateTable>, ledger: LedgerStore, currency_symbol: &str) -> Self {
        Self {
            rates,
            ledger,
            tally: ActivityTally::default(),
            currency_symbol: currency_symbol.to_string(),
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn tally(&self) -> &ActivityTally {
        &self.tally
    }

    /// Decode a text frame and apply whatever activity it carries.
    pub fn handle_text(&mut self, text: &str) -> FrameOutcome {
        debug!("Message from server: {text}");
        match protocol::decode(text) {
            Ok(Inbound::Response { nonce, error, data }) => {
                self.tally.responses += 1;
                match error {
                    Some(err) => warn!("Request {nonce:?} rejected: {err} ({data})"),
                    None => info!("Received response for {nonce:?}: {data}"),
                }
                FrameOutcome::Response
            }
            Ok(Inbound::Activity(event)) => {
                let (delta, update) = self.handle_activity(event);
                FrameOutcome::Activity { delta, update }
            }
            Ok(Inbound::Ignored { kind, topic }) => {
                debug!("Ignoring {kind} frame (topic: {topic:?})");
                FrameOutcome::Ignored
            }
            Err(e) => {
                self.tally.malformed_frames += 1;
                warn!("Dropping malformed frame: {e:#}");
                FrameOutcome::Malformed
            }
        }
    }

    /// Classify one activity and apply its delta to the ledgers.
    pub fn handle_activity(&mut self, event: ActivityEvent) -> (Delta, Option<LedgerUpdate>) {
        self.tally.record(&event.kind);
        let who = event.username.as_deref().unwrap_or("<unknown>");
        match &event.kind {
            ActivityKind::Follow => info!("New follower: {who}"),
            ActivityKind::Subscription => {
                info!("New subscriber: {who} | Tier: {:?} | Amount: {:?}", event.tier, event.amount)
            }
            ActivityKind::Tip => info!("New donation (tip): {who} | Amount: {:?}", event.amount),
            ActivityKind::Cheer => info!("Bits donation: {who} | Amount: {:?}", event.amount),
            ActivityKind::Other(kind) => info!("Other activity: {kind}"),
        }

        let delta = classify(&event, &self.rates);
        if delta.is_zero() || !self.ledger.apply(delta) {
            return (delta, None);
        }

        let update = LedgerUpdate {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind: event.kind.label().to_string(),
            username: event.username,
            points_delta: delta.points,
            earnings_delta: delta.earnings,
            points_total: self.ledger.points_total(),
            earnings_total: self.ledger.earnings_total(),
        };
        (delta, Some(update))
    }

    pub fn exit_summary(&self, sessions_opened: u64) -> ExitSummary {
        ExitSummary {
            points_total: self.ledger.points_total(),
            earnings_total: self.ledger.earnings_total(),
            currency_symbol: self.currency_symbol.clone(),
            sessions_opened,
            activities: self.tally.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn activity(kind: &str, data: serde_json::Value) -> String {
        json!({
            "type": "message",
            "topic": "channel.activities",
            "data": {"type": kind, "data": data}
        })
        .to_string()
    }

    fn engine(dir: &std::path::Path, use_earnings: bool) -> ActivityEngine {
        let config = LedgerConfig {
            use_earnings,
            ..LedgerConfig::default()
        };
        ActivityEngine::new(
            Arc::new(RateTable::default()),
            LedgerStore::open(&config, dir),
            &config.currency_symbol,
        )
    }

    #[test]
    fn follow_subscription_cheer_sequence_totals_970() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);

        engine.handle_text(&activity("follow", json!({"username": "a"})));
        engine.handle_text(&activity(
            "subscriber",
            json!({"username": "b", "tier": "2000", "amount": 3}),
        ));
        engine.handle_text(&activity("cheer", json!({"username": "c", "amount": 250})));

        assert_eq!(engine.ledger().points_total(), Some(dec!(970)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("points.txt")).unwrap(),
            "970.00"
        );
        assert_eq!(engine.tally().follows, 1);
        assert_eq!(engine.tally().subscriptions, 1);
        assert_eq!(engine.tally().cheers, 1);
    }

    #[test]
    fn activity_update_carries_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), true);
        let outcome = engine.handle_text(&activity("tip", json!({"username": "d", "amount": "2"})));
        let FrameOutcome::Activity { delta, update } = outcome else {
            panic!("expected activity outcome");
        };
        assert_eq!(delta, Delta::new(dec!(120), dec!(120)));
        let update = update.expect("ledger changed");
        assert_eq!(update.kind, "tip");
        assert_eq!(update.username.as_deref(), Some("d"));
        assert_eq!(update.points_total, Some(dec!(120)));
        assert_eq!(update.earnings_total, Some(dec!(120)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("earnings.txt")).unwrap(),
            "120.00$"
        );
    }

    #[test]
    fn small_cheer_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);
        let outcome = engine.handle_text(&activity("cheer", json!({"amount": 99})));
        assert_eq!(
            outcome,
            FrameOutcome::Activity {
                delta: Delta::ZERO,
                update: None
            }
        );
        assert_eq!(engine.ledger().points_total(), Some(dec!(0)));
    }

    #[test]
    fn non_numeric_amount_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);
        engine.handle_text(&activity("tip", json!({"amount": "lots"})));
        engine.handle_text(&activity("subscriber", json!({"tier": "1000"})));
        assert_eq!(engine.ledger().points_total(), Some(dec!(0)));
        assert_eq!(engine.tally().tips, 1);
    }

    #[test]
    fn out_of_range_tip_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), true);
        let outcome = engine.handle_text(&activity("tip", json!({"amount": "1e28"})));
        assert_eq!(
            outcome,
            FrameOutcome::Activity {
                delta: Delta::ZERO,
                update: None
            }
        );
        engine.handle_text(&activity("follow", json!({})));
        assert_eq!(engine.ledger().points_total(), Some(dec!(10)));
        assert_eq!(engine.tally().tips, 1);
    }

    #[test]
    fn unknown_activity_is_counted_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);
        engine.handle_text(&activity("raid", json!({"amount": 40})));
        assert_eq!(engine.tally().other, 1);
        assert_eq!(engine.ledger().points_total(), Some(dec!(0)));
    }

    #[test]
    fn malformed_frame_does_not_stop_processing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);
        assert_eq!(engine.handle_text("{not json"), FrameOutcome::Malformed);
        engine.handle_text(&activity("follow", json!({"username": "a"})));
        assert_eq!(engine.tally().malformed_frames, 1);
        assert_eq!(engine.ledger().points_total(), Some(dec!(10)));
    }

    #[test]
    fn responses_and_other_topics_are_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), false);
        let response = json!({"type": "response", "data": {"message": "ok"}}).to_string();
        assert_eq!(engine.handle_text(&response), FrameOutcome::Response);
        let other = json!({"type": "message", "topic": "channel.tips", "data": {}}).to_string();
        assert_eq!(engine.handle_text(&other), FrameOutcome::Ignored);
        assert_eq!(engine.tally().responses, 1);
        assert_eq!(engine.ledger().points_total(), Some(dec!(0)));
    }

    #[test]
    fn exit_summary_reports_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), true);
        engine.handle_text(&activity("follow", json!({})));
        let summary = engine.exit_summary(3);
        assert_eq!(summary.points_total, Some(dec!(10)));
        assert_eq!(summary.earnings_total, Some(dec!(10)));
        assert_eq!(summary.currency_symbol, "$");
        assert_eq!(summary.sessions_opened, 3);
        assert_eq!(summary.activities.follows, 1);
    }
}
