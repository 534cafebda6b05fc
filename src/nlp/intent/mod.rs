use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of canonical intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    LogInteraction,
    Query,
    SetReminder,
    UpdateContact,
    Archive,
    Onboarding,
    Clarify,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::LogInteraction,
        Intent::Query,
        Intent::SetReminder,
        Intent::UpdateContact,
        Intent::Archive,
        Intent::Onboarding,
        Intent::Clarify,
        Intent::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogInteraction => "log_interaction",
            Self::Query => "query",
            Self::SetReminder => "set_reminder",
            Self::UpdateContact => "update_contact",
            Self::Archive => "archive",
            Self::Onboarding => "onboarding",
            Self::Clarify => "clarify",
            Self::Unknown => "unknown",
        }
    }

    /// Exact match against the canonical labels.
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == label)
    }

    /// Like [`Intent::parse`], but anything unrecognized becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        Self::parse(label.trim()).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the classifier matched a mentioned name against the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    New,
    Ambiguous,
    #[serde(rename = "none")]
    Unmatched,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::New => "new",
            Self::Ambiguous => "ambiguous",
            Self::Unmatched => "none",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            "new" => Some(Self::New),
            "ambiguous" => Some(Self::Ambiguous),
            "none" => Some(Self::Unmatched),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRef {
    pub name: String,
    pub match_type: MatchType,
}

impl ContactRef {
    pub fn new(name: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            name: name.into(),
            match_type,
        }
    }
}

/// Intent plus the fields that intent is allowed to carry.
///
/// Fields irrelevant to an intent cannot be represented, so a stale
/// `follow_up_date` can never ride along on, say, a `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentAction {
    LogInteraction {
        interaction_date: Option<NaiveDate>,
        follow_up_date: Option<NaiveDate>,
    },
    Query,
    SetReminder {
        follow_up_date: Option<NaiveDate>,
    },
    UpdateContact {
        new_name: Option<String>,
    },
    Archive,
    Onboarding {
        interaction_date: Option<NaiveDate>,
        follow_up_date: Option<NaiveDate>,
    },
    Clarify,
    Unknown,
}

impl IntentAction {
    pub fn intent(&self) -> Intent {
        match self {
            Self::LogInteraction { .. } => Intent::LogInteraction,
            Self::Query => Intent::Query,
            Self::SetReminder { .. } => Intent::SetReminder,
            Self::UpdateContact { .. } => Intent::UpdateContact,
            Self::Archive => Intent::Archive,
            Self::Onboarding { .. } => Intent::Onboarding,
            Self::Clarify => Intent::Clarify,
            Self::Unknown => Intent::Unknown,
        }
    }

    /// Whether this intent honors a `needs_clarification` flag from the classifier.
    pub fn accepts_clarification(&self) -> bool {
        matches!(self, Self::Archive | Self::Onboarding { .. } | Self::Clarify)
    }
}

/// One normalized classifier result. Built fresh per turn, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedIntent {
    pub action: IntentAction,
    pub contacts: Vec<ContactRef>,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub response_message: Option<String>,
}

impl ClassifiedIntent {
    pub fn intent(&self) -> Intent {
        self.action.intent()
    }

    /// An `unknown` result carrying the given reply.
    pub fn fallback(message: impl Into<String>) -> Self {
        Self {
            action: IntentAction::Unknown,
            contacts: Vec::new(),
            needs_clarification: false,
            clarification_question: None,
            response_message: Some(message.into()),
        }
    }

    pub fn contact_names(&self) -> Vec<String> {
        self.contacts.iter().map(|c| c.name.clone()).collect()
    }

    /// Ask `question` instead of acting.
    pub fn require_clarification(&mut self, question: impl Into<String>) {
        self.needs_clarification = true;
        self.clarification_question = Some(question.into());
    }

    /// The text to send back for this turn, if any.
    pub fn reply(&self) -> Option<&str> {
        let reply = if self.needs_clarification {
            self.clarification_question.as_deref()
        } else {
            self.response_message.as_deref()
        };
        reply.filter(|r| !r.trim().is_empty())
    }
}

#[cfg(test)]
mod tests;
