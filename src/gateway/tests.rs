use super::*;
use crate::classifier::{Classifier, ClassifyRequest};
use crate::delivery::{Delivery, Recipient};
use crate::ledger::{Channel, ContactLedger, NewUser, SqliteLedger};
use crate::orchestrator::OrchestratorDeps;
use crate::state::SqliteStateStore;
use crate::utils::ManualClock;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tower::ServiceExt;

const PHONE: &str = "+15551234567";
const CHAT_ID: &str = "4242";
const SMS_URL: &str = "https://rolodex.example.com/sms-webhook";

struct FixedClassifier;

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _request: ClassifyRequest<'_>) -> anyhow::Result<String> {
        Ok(serde_json::json!({
            "intent": "log_interaction",
            "contacts": [{"name": "Sarah", "match_type": "new"}],
            "response_message": "Logged coffee with Sarah."
        })
        .to_string())
    }
}

#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(Recipient, String)>>,
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, to: &Recipient, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((to.clone(), text.to_string()));
        Ok(())
    }
}

struct Fixture {
    router: Router,
    ledger: Arc<SqliteLedger>,
    delivery: Arc<RecordingDelivery>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 17, 15, 0, 0).unwrap(),
    ));
    let state_store = Arc::new(SqliteStateStore::open_in_memory(clock.clone()).unwrap());
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    ledger
        .add_user(&NewUser {
            phone: PHONE.to_string(),
            name: "Alex".to_string(),
            telegram_chat_id: Some(CHAT_ID.to_string()),
            timezone: None,
            default_reminder_days: None,
        })
        .unwrap();
    let delivery = Arc::new(RecordingDelivery::default());
    let orchestrator = Orchestrator::new(OrchestratorDeps {
        state: state_store,
        directory: ledger.clone(),
        ledger: ledger.clone(),
        classifier: Arc::new(FixedClassifier),
        delivery: delivery.clone(),
        clock: clock.clone(),
    });
    let sweep = ReminderSweep::new(
        ledger.clone(),
        ledger.clone(),
        delivery.clone(),
        clock,
        Channel::Telegram,
    );
    let router = build_router(GatewayState {
        orchestrator: Arc::new(orchestrator),
        sweep: Arc::new(sweep),
        telegram_secret: "tg-secret".to_string(),
        twilio_auth_token: "twilio-token".to_string(),
        twilio_webhook_url: SMS_URL.to_string(),
        sweep_secret: "cron-secret".to_string(),
    });
    Fixture {
        router,
        ledger,
        delivery,
    }
}

fn telegram_update(update_id: i64, chat_id: &str, text: &str) -> String {
    serde_json::json!({
        "update_id": update_id,
        "message": {"message_id": 1, "chat": {"id": chat_id.parse::<i64>().unwrap()}, "text": text}
    })
    .to_string()
}

async fn body_string(resp: axum::http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 65536).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint_returns_json() {
    let f = fixture();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], crate::VERSION);
}

#[tokio::test]
async fn test_telegram_rejects_bad_secret() {
    let f = fixture();
    let req = Request::builder()
        .method("POST")
        .uri("/telegram-webhook")
        .header("content-type", "application/json")
        .header(telegram::SECRET_HEADER, "nope")
        .body(Body::from(telegram_update(1, CHAT_ID, "hi")))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(f.delivery.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_telegram_message_runs_turn() {
    let f = fixture();
    let req = Request::builder()
        .method("POST")
        .uri("/telegram-webhook")
        .header("content-type", "application/json")
        .header(telegram::SECRET_HEADER, "tg-secret")
        .body(Body::from(telegram_update(77, CHAT_ID, "Had coffee with Sarah")))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let sent = f.delivery.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Recipient::new(Channel::Telegram, CHAT_ID));
    assert_eq!(sent[0].1, "Logged coffee with Sarah.");
    assert!(f.ledger.find_contact(PHONE, "Sarah").unwrap().is_some());
}

#[tokio::test]
async fn test_telegram_unknown_chat_gets_registration_hint() {
    let f = fixture();
    let req = Request::builder()
        .method("POST")
        .uri("/telegram-webhook")
        .header(telegram::SECRET_HEADER, "tg-secret")
        .body(Body::from(telegram_update(78, "999", "hello")))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let sent = f.delivery.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("999"));
}

#[tokio::test]
async fn test_telegram_garbage_body_acknowledged() {
    let f = fixture();
    let req = Request::builder()
        .method("POST")
        .uri("/telegram-webhook")
        .header(telegram::SECRET_HEADER, "tg-secret")
        .body(Body::from("not json"))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(f.delivery.sent.lock().unwrap().is_empty());
}

fn sms_form(sid: &str, body: &str) -> (String, String) {
    let params: HashMap<String, String> = [
        ("From", PHONE),
        ("To", "+15550009999"),
        ("Body", body),
        ("MessageSid", sid),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let signature = twilio::compute_signature("twilio-token", SMS_URL, &params);
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    (encoded, signature)
}

#[tokio::test]
async fn test_sms_rejects_missing_signature() {
    let f = fixture();
    let (form, _) = sms_form("SM1", "hi");
    let req = Request::builder()
        .method("POST")
        .uri("/sms-webhook")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sms_rejects_bad_signature() {
    let f = fixture();
    let (form, _) = sms_form("SM1", "hi");
    let req = Request::builder()
        .method("POST")
        .uri("/sms-webhook")
        .header("content-type", "application/x-www-form-urlencoded")
        .header(twilio::SIGNATURE_HEADER, "AAAA")
        .body(Body::from(form))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(f.delivery.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sms_signed_message_runs_turn() {
    let f = fixture();
    let (form, signature) = sms_form("SM42", "Had coffee with Sarah");
    let req = Request::builder()
        .method("POST")
        .uri("/sms-webhook")
        .header("content-type", "application/x-www-form-urlencoded")
        .header(twilio::SIGNATURE_HEADER, signature)
        .body(Body::from(form))
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("<Response></Response>"));

    let sent = f.delivery.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Recipient::new(Channel::Sms, PHONE));
}

#[tokio::test]
async fn test_reminder_cron_requires_bearer() {
    let f = fixture();
    let req = Request::builder()
        .method("POST")
        .uri("/reminder-cron")
        .body(Body::empty())
        .unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/reminder-cron")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reminder_cron_runs_sweep() {
    let f = fixture();
    let mut contact = crate::ledger::Contact::new("Sarah");
    contact.reminder_date = chrono::NaiveDate::from_ymd_opt(2026, 2, 17);
    contact.last_interaction_message = Some("coffee".to_string());
    f.ledger.add_contact(PHONE, &contact).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/reminder-cron")
        .header("authorization", "Bearer cron-secret")
        .body(Body::empty())
        .unwrap();
    let resp = f.router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OK");

    let sent = f.delivery.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Rolodex reminders:\n- Sarah (last: coffee)");
}

#[test]
fn test_bearer_matches() {
    let mut headers = HeaderMap::new();
    assert!(!bearer_matches(&headers, "s"));
    headers.insert(header::AUTHORIZATION, "Bearer s".parse().unwrap());
    assert!(bearer_matches(&headers, "s"));
    assert!(!bearer_matches(&headers, ""));
    headers.insert(header::AUTHORIZATION, "Basic s".parse().unwrap());
    assert!(!bearer_matches(&headers, "s"));
}
