// Shared test helpers; not every test binary uses every item.
#![allow(unused)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rolodex::classifier::{Classifier, ClassifyRequest};
use rolodex::delivery::{Delivery, Recipient};
use rolodex::ledger::{Channel, Contact, ContactLedger, NewUser, SqliteLedger};
use rolodex::nlp::Intent;
use rolodex::orchestrator::{InboundMessage, Orchestrator, OrchestratorDeps, TurnOutcome, TurnSummary};
use rolodex::state::SqliteStateStore;
use rolodex::utils::ManualClock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PHONE: &str = "+15551234567";
pub const CHAT_ID: &str = "4242";

/// 10:00 in New York on 2026-02-17.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 17, 15, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// What the classifier saw on one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub text: String,
    pub contact_names: Vec<String>,
    pub pending_intent: Option<Intent>,
    pub local_date: String,
}

/// Replays canned classifier payloads in order. Once the script runs out it
/// answers with `unknown`.
#[derive(Default)]
pub struct ScriptedClassifier {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub seen: Mutex<Vec<SeenRequest>>,
    latency: Mutex<Duration>,
}

impl ScriptedClassifier {
    /// Make every call take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn push(&self, payload: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(payload.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: ClassifyRequest<'_>) -> anyhow::Result<String> {
        self.seen.lock().unwrap().push(SeenRequest {
            text: request.text.to_string(),
            contact_names: request.contact_names.to_vec(),
            pending_intent: request.pending_context.map(|c| c.pending_intent),
            local_date: request.local_date.to_string(),
        });
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(r#"{"intent": "unknown"}"#.to_string()),
        }
    }
}

#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<(Recipient, String)>>,
}

impl RecordingDelivery {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, to: &Recipient, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((to.clone(), text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub state: Arc<SqliteStateStore>,
    pub ledger: Arc<SqliteLedger>,
    pub classifier: Arc<ScriptedClassifier>,
    pub delivery: Arc<RecordingDelivery>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_batch_window(Duration::ZERO)
    }

    pub fn with_batch_window(window: Duration) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let state = Arc::new(SqliteStateStore::open_in_memory(clock.clone()).unwrap());
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        ledger
            .add_user(&NewUser {
                phone: PHONE.to_string(),
                name: "Alex".to_string(),
                telegram_chat_id: Some(CHAT_ID.to_string()),
                timezone: Some("America/New_York".to_string()),
                default_reminder_days: Some(14),
            })
            .unwrap();
        let classifier = Arc::new(ScriptedClassifier::default());
        let delivery = Arc::new(RecordingDelivery::default());
        let orchestrator = Orchestrator::new(OrchestratorDeps {
            state: state.clone(),
            directory: ledger.clone(),
            ledger: ledger.clone(),
            classifier: classifier.clone(),
            delivery: delivery.clone(),
            clock: clock.clone(),
        })
        .with_batch_window(window);
        Self {
            orchestrator: Arc::new(orchestrator),
            state,
            ledger,
            classifier,
            delivery,
            clock,
        }
    }

    pub async fn seed(&self, contact: Contact) {
        self.ledger.add_contact(PHONE, &contact).await.unwrap();
    }

    pub fn contact(&self, name: &str) -> Option<Contact> {
        self.ledger.find_contact(PHONE, name).unwrap()
    }

    pub async fn send(&self, id: &str, text: &str) -> TurnOutcome {
        self.orchestrator.handle(&sms(id, text)).await
    }
}

pub fn sms(id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel: Channel::Sms,
        sender: PHONE.to_string(),
        message_id: id.to_string(),
        text: text.to_string(),
    }
}

pub fn telegram(id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel: Channel::Telegram,
        sender: CHAT_ID.to_string(),
        message_id: id.to_string(),
        text: text.to_string(),
    }
}

pub fn contact_with(name: &str, last: Option<&str>, reminder: Option<&str>) -> Contact {
    Contact {
        last_contact_date: last.map(date),
        reminder_date: reminder.map(date),
        last_interaction_message: last.map(|_| format!("caught up with {name}")),
        ..Contact::new(name)
    }
}

pub fn completed(outcome: TurnOutcome) -> TurnSummary {
    match outcome {
        TurnOutcome::Completed(summary) => summary,
        other => panic!("expected a completed turn, got {other:?}"),
    }
}
