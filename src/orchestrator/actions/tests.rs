use super::*;
use crate::ledger::SqliteLedger;
use crate::nlp::MatchType;

const SCOPE: &str = "+15551234567";
const TODAY: &str = "2026-02-17";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn exact(name: &str) -> ContactRef {
    ContactRef::new(name, MatchType::Exact)
}

fn scope<'a>(ledger: &'a SqliteLedger, roster: &'a [Contact], raw: &'a str) -> ActionScope<'a> {
    ActionScope {
        ledger,
        scope: SCOPE,
        today: date(TODAY),
        default_reminder_days: 14,
        raw_message: raw,
        roster,
    }
}

async fn seeded(reminder: Option<&str>) -> (SqliteLedger, Vec<Contact>) {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let sarah = Contact {
        last_contact_date: Some(date("2026-01-10")),
        reminder_date: reminder.map(date),
        ..Contact::new("Sarah Chen")
    };
    ledger.add_contact(SCOPE, &sarah).await.unwrap();
    let roster = ledger.list_active_contacts(SCOPE).await.unwrap();
    (ledger, roster)
}

#[tokio::test]
async fn test_log_preserves_existing_reminder() {
    let (ledger, roster) = seeded(Some("2026-02-20")).await;
    let s = scope(&ledger, &roster, "Had coffee with Sarah");
    log_interaction(&s, &[exact("Sarah Chen")], None, None)
        .await
        .unwrap();

    let contact = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(contact.reminder_date, Some(date("2026-02-20")));
    assert_eq!(contact.last_contact_date, Some(date(TODAY)));
    assert_eq!(
        contact.last_interaction_message.as_deref(),
        Some("Had coffee with Sarah")
    );

    let logs = ledger.get_recent_logs(SCOPE, 5).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].contact_name, "Sarah Chen");
    assert_eq!(logs[0].intent, Intent::LogInteraction);
}

#[tokio::test]
async fn test_log_without_reminder_uses_default() {
    let (ledger, roster) = seeded(None).await;
    let s = scope(&ledger, &roster, "Saw Sarah");
    log_interaction(&s, &[exact("Sarah Chen")], Some(date("2026-02-16")), None)
        .await
        .unwrap();

    let contact = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(contact.reminder_date, Some(date("2026-03-03")));
    assert_eq!(contact.last_contact_date, Some(date("2026-02-16")));
}

#[tokio::test]
async fn test_log_explicit_follow_up_wins() {
    let (ledger, roster) = seeded(Some("2026-02-20")).await;
    let s = scope(&ledger, &roster, "Lunch with Sarah, follow up in 3 weeks");
    log_interaction(&s, &[exact("Sarah Chen")], None, Some(date("2026-03-10")))
        .await
        .unwrap();
    let contact = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(contact.reminder_date, Some(date("2026-03-10")));
}

#[tokio::test]
async fn test_log_creates_missing_contact() {
    let (ledger, roster) = seeded(None).await;
    let s = scope(&ledger, &roster, "Drinks with Becca");
    log_interaction(&s, &[ContactRef::new("Becca", MatchType::New)], None, None)
        .await
        .unwrap();

    let becca = ledger.find_contact(SCOPE, "Becca").unwrap().unwrap();
    assert_eq!(becca.last_contact_date, Some(date(TODAY)));
    assert_eq!(becca.reminder_date, Some(date("2026-03-03")));
}

#[tokio::test]
async fn test_set_reminder_always_recomputes_default() {
    let (ledger, roster) = seeded(Some("2026-02-20")).await;
    let s = scope(&ledger, &roster, "Remind me about Sarah");
    set_reminder(&s, &[exact("Sarah Chen")], None).await.unwrap();
    let contact = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(contact.reminder_date, Some(date("2026-03-03")));
    // last contact is untouched
    assert_eq!(contact.last_contact_date, Some(date("2026-01-10")));
}

#[tokio::test]
async fn test_set_reminder_unknown_contact_is_not_found() {
    let (ledger, roster) = seeded(None).await;
    let s = scope(&ledger, &roster, "Remind me about Zed");
    let err = set_reminder(&s, &[exact("Zed")], None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RolodexError>(),
        Some(RolodexError::ContactNotFound { name }) if name == "Zed"
    ));
    assert!(ledger.get_recent_logs(SCOPE, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rename_logs_under_new_name() {
    let (ledger, roster) = seeded(None).await;
    let s = scope(&ledger, &roster, "Rename Sarah Chen to Sarah Lee");
    rename(&s, &[exact("Sarah Chen")], "Sarah Lee").await.unwrap();
    let logs = ledger.get_recent_logs(SCOPE, 5).await.unwrap();
    assert_eq!(logs[0].contact_name, "Sarah Lee");
    assert_eq!(logs[0].intent, Intent::UpdateContact);
}

#[tokio::test]
async fn test_archive_missing_contact_is_not_found() {
    let (ledger, roster) = seeded(None).await;
    let s = scope(&ledger, &roster, "Remove Zed");
    assert!(archive(&s, &[exact("Zed")]).await.is_err());
    archive(&s, &[exact("Sarah Chen")]).await.unwrap();
    assert!(ledger.list_active_contacts(SCOPE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_only_logs() {
    let (ledger, roster) = seeded(Some("2026-02-20")).await;
    let s = scope(&ledger, &roster, "When did I last talk to Sarah?");
    record_query(&s, &[exact("Sarah Chen")]).await.unwrap();
    let contact = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(contact, roster[0]);
    assert_eq!(ledger.get_recent_logs(SCOPE, 5).await.unwrap()[0].intent, Intent::Query);
}

#[tokio::test]
async fn test_onboard_adds_contact_with_default_reminder() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let s = scope(&ledger, &[], "Add my new coworker Priya");
    onboard(&s, &[ContactRef::new("Priya", MatchType::New)], None, None)
        .await
        .unwrap();
    let priya = ledger.find_contact(SCOPE, "Priya").unwrap().unwrap();
    assert_eq!(priya.reminder_date, Some(date("2026-03-03")));
    assert_eq!(ledger.get_recent_logs(SCOPE, 5).await.unwrap()[0].intent, Intent::Onboarding);
}

#[tokio::test]
async fn test_onboard_keeps_reminder_already_on_file() {
    let (ledger, roster) = seeded(Some("2026-02-20")).await;
    let s = scope(&ledger, &roster, "Add Sarah Chen");
    onboard(&s, &[exact("Sarah Chen")], None, None).await.unwrap();
    let sarah = ledger.find_contact(SCOPE, "Sarah Chen").unwrap().unwrap();
    assert_eq!(sarah.reminder_date, Some(date("2026-02-20")));
    assert_eq!(sarah.last_contact_date, Some(date(TODAY)));
}

#[test]
fn test_negative_reminder_days_go_backwards() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let s = ActionScope {
        default_reminder_days: -3,
        ..scope(&ledger, &[], "")
    };
    assert_eq!(s.default_reminder().unwrap(), date("2026-02-14"));
}
