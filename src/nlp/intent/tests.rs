use super::*;

#[test]
fn intent_labels_round_trip() {
    for intent in Intent::ALL {
        assert_eq!(Intent::parse(intent.as_str()), Some(intent));
    }
}

#[test]
fn unrecognized_label_becomes_unknown() {
    assert_eq!(Intent::from_label("delete_everything"), Intent::Unknown);
    assert_eq!(Intent::from_label(""), Intent::Unknown);
    assert_eq!(Intent::from_label(" query "), Intent::Query);
}

#[test]
fn intent_serializes_snake_case() {
    let json = serde_json::to_string(&Intent::LogInteraction).unwrap();
    assert_eq!(json, "\"log_interaction\"");
}

#[test]
fn match_type_none_label() {
    assert_eq!(MatchType::parse("none"), Some(MatchType::Unmatched));
    assert_eq!(MatchType::Unmatched.as_str(), "none");
    assert_eq!(MatchType::parse("maybe"), None);
}

#[test]
fn reply_prefers_clarification_question() {
    let mut result = ClassifiedIntent::fallback("hello");
    assert_eq!(result.reply(), Some("hello"));

    result.require_clarification("Which John?");
    assert_eq!(result.reply(), Some("Which John?"));
}

#[test]
fn reply_is_none_when_clarifying_without_question() {
    let result = ClassifiedIntent {
        action: IntentAction::Archive,
        contacts: vec![],
        needs_clarification: true,
        clarification_question: None,
        response_message: Some("ignored".to_string()),
    };
    assert_eq!(result.reply(), None);
}

#[test]
fn blank_reply_is_silent() {
    let result = ClassifiedIntent::fallback("   ");
    assert_eq!(result.reply(), None);
}

#[test]
fn only_confirmable_intents_accept_clarification() {
    assert!(IntentAction::Archive.accepts_clarification());
    assert!(IntentAction::Clarify.accepts_clarification());
    assert!(
        IntentAction::Onboarding {
            interaction_date: None,
            follow_up_date: None
        }
        .accepts_clarification()
    );
    assert!(!IntentAction::Query.accepts_clarification());
    assert!(
        !IntentAction::LogInteraction {
            interaction_date: None,
            follow_up_date: None
        }
        .accepts_clarification()
    );
}
