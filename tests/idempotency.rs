mod common;

use chrono::Duration;
use common::{Harness, completed, telegram};
use rolodex::ledger::ContactLedger;
use rolodex::orchestrator::TurnOutcome;
use rolodex::state::StateStore;
use serde_json::json;

fn log_sarah() -> serde_json::Value {
    json!({
        "intent": "log_interaction",
        "contacts": [{"name": "Sarah Chen", "match_type": "new"}],
        "response_message": "Logged coffee with Sarah Chen."
    })
}

#[tokio::test]
async fn test_redelivery_produces_one_set_of_side_effects() {
    let h = Harness::new();
    h.classifier.push(log_sarah());
    h.classifier.push(log_sarah());

    completed(h.send("SM100", "Had coffee with Sarah").await);
    for _ in 0..3 {
        assert_eq!(h.send("SM100", "Had coffee with Sarah").await, TurnOutcome::Duplicate);
    }

    assert_eq!(h.classifier.calls().len(), 1);
    assert_eq!(h.delivery.texts().len(), 1);
    let logs = h.ledger.get_recent_logs(common::PHONE, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_telegram_update_ids_are_deduplicated() {
    let h = Harness::new();
    h.classifier.push(log_sarah());

    let msg = telegram("9001", "Had coffee with Sarah");
    completed(h.orchestrator.handle(&msg).await);
    assert_eq!(h.orchestrator.handle(&msg).await, TurnOutcome::Duplicate);
    assert_eq!(h.delivery.texts(), vec!["Logged coffee with Sarah Chen."]);
}

#[tokio::test]
async fn test_marked_before_work_so_failed_turns_are_not_retried() {
    let h = Harness::new();
    // archive of an unknown contact fails mid-turn
    h.classifier.push(json!({
        "intent": "archive",
        "contacts": [{"name": "Ghost", "match_type": "exact"}]
    }));
    assert_eq!(h.send("SM1", "remove ghost").await, TurnOutcome::Failed);
    assert!(h.state.is_processed("SM1").await.unwrap());
    assert_eq!(h.send("SM1", "remove ghost").await, TurnOutcome::Duplicate);
    assert_eq!(h.classifier.calls().len(), 1);
}

#[tokio::test]
async fn test_record_expiry_boundary() {
    let h = Harness::new();
    completed(h.send("SM7", "hello").await);

    h.clock.advance(Duration::hours(1) - Duration::milliseconds(1));
    assert_eq!(h.send("SM7", "hello").await, TurnOutcome::Duplicate);

    // expire_at == now: no longer counts as processed
    h.clock.advance(Duration::milliseconds(1));
    assert!(!h.state.is_processed("SM7").await.unwrap());
    completed(h.send("SM7", "hello").await);
    assert_eq!(h.classifier.calls().len(), 2);
}
