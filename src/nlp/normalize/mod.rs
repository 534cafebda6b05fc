use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use super::extract::extract_json;
use super::intent::{ClassifiedIntent, ContactRef, Intent, IntentAction, MatchType};

pub const FALLBACK_MESSAGE: &str =
    "I couldn't understand that. Try something like 'Had coffee with Sarah'.";

/// Normalize raw classifier text. Never fails: anything unparseable becomes
/// the `unknown` fallback.
pub fn normalize_response(raw: &str) -> ClassifiedIntent {
    match extract_json(raw) {
        Some(value) => normalize_value(&value),
        None => {
            debug!("classifier output had no JSON object, using fallback");
            ClassifiedIntent::fallback(FALLBACK_MESSAGE)
        }
    }
}

/// Normalize an already-parsed payload.
///
/// Accepts both the flat shape (`intent`, `contacts`, `follow_up_date`, ...)
/// and the sectioned shape (`intent.value`, `contact.name`, `fields.*`,
/// `response.message`). Flat keys win when both are present.
pub fn normalize_value(payload: &Value) -> ClassifiedIntent {
    let intent = read_intent(payload);
    let contacts = read_contacts(payload);

    let interaction_date = read_date(payload, "interaction_date");
    let follow_up_date = read_date(payload, "follow_up_date");

    let action = match intent {
        Intent::LogInteraction => IntentAction::LogInteraction {
            interaction_date,
            follow_up_date,
        },
        Intent::Query => IntentAction::Query,
        Intent::SetReminder => IntentAction::SetReminder { follow_up_date },
        Intent::UpdateContact => IntentAction::UpdateContact {
            new_name: read_string(payload, "fields", "new_name"),
        },
        Intent::Archive => IntentAction::Archive,
        Intent::Onboarding => IntentAction::Onboarding {
            interaction_date,
            follow_up_date,
        },
        Intent::Clarify => IntentAction::Clarify,
        Intent::Unknown => IntentAction::Unknown,
    };

    let response_message = read_string(payload, "response", "response_message")
        .or_else(|| section_string(payload, "response", "message"));

    let (needs_clarification, clarification_question) = if action.accepts_clarification() {
        (
            read_bool(payload, "needs_clarification"),
            read_string(payload, "response", "clarification_question"),
        )
    } else {
        (false, None)
    };

    let mut result = ClassifiedIntent {
        action,
        contacts,
        needs_clarification,
        clarification_question,
        response_message,
    };

    if result
        .contacts
        .iter()
        .any(|c| c.match_type == MatchType::Ambiguous)
    {
        force_clarify(&mut result, payload);
    }

    result
}

/// An ambiguous contact always turns the turn into a clarification,
/// whatever the classifier said the intent was.
fn force_clarify(result: &mut ClassifiedIntent, payload: &Value) {
    let question = result
        .clarification_question
        .take()
        .or_else(|| read_string(payload, "response", "clarification_question"))
        .or_else(|| result.response_message.clone())
        .unwrap_or_else(|| {
            let names: Vec<&str> = result.contacts.iter().map(|c| c.name.as_str()).collect();
            format!("Which contact did you mean: {}?", names.join(" or "))
        });

    if result.intent() != Intent::Clarify {
        debug!(
            "ambiguous contact forces clarify (classifier said {})",
            result.intent()
        );
    }
    result.action = IntentAction::Clarify;
    result.require_clarification(question);
}

fn read_intent(payload: &Value) -> Intent {
    match payload.get("intent") {
        Some(Value::String(label)) => Intent::from_label(label),
        Some(Value::Object(section)) => section
            .get("value")
            .and_then(Value::as_str)
            .map_or(Intent::Unknown, Intent::from_label),
        _ => Intent::Unknown,
    }
}

fn read_contacts(payload: &Value) -> Vec<ContactRef> {
    let mut out = Vec::new();

    match payload.get("contacts") {
        Some(Value::Array(items)) => {
            for item in items {
                push_contact(&mut out, item.get("name"), item.get("match_type"));
            }
        }
        Some(_) => {}
        None => {
            if let Some(section) = payload.get("contact").filter(|v| v.is_object()) {
                push_contact(&mut out, section.get("name"), section.get("match_type"));
            }
        }
    }

    out
}

fn push_contact(out: &mut Vec<ContactRef>, name: Option<&Value>, match_type: Option<&Value>) {
    let stated = match_type.and_then(Value::as_str).and_then(MatchType::parse);

    match name {
        Some(Value::String(name)) if !name.trim().is_empty() => {
            out.push(ContactRef::new(
                name.trim(),
                stated.unwrap_or(MatchType::Exact),
            ));
        }
        // A list of names is the classifier's way of saying "one of these".
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            let match_type = if names.len() > 1 {
                MatchType::Ambiguous
            } else {
                stated.unwrap_or(MatchType::Exact)
            };
            out.extend(names.into_iter().map(|n| ContactRef::new(n, match_type)));
        }
        _ => {}
    }
}

/// A top-level string, falling back to `section.key`.
fn read_string(payload: &Value, section: &str, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| section_string(payload, section, key))
        .or_else(|| section_string(payload, "fields", key))
        .filter(|s| !s.trim().is_empty())
}

fn section_string(payload: &Value, section: &str, key: &str) -> Option<String> {
    payload
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

fn read_bool(payload: &Value, key: &str) -> bool {
    payload
        .get(key)
        .or_else(|| payload.get("fields").and_then(|f| f.get(key)))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn read_date(payload: &Value, key: &str) -> Option<NaiveDate> {
    let raw = read_string(payload, "fields", key)?;
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            debug!("ignoring unparseable {}: {:?}", key, raw);
            None
        }
    }
}
