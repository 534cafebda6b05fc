//! The text-understanding collaborator.
//!
//! A [`Classifier`] turns one turn's text plus its surrounding state into raw
//! response text. It makes no promise that the text is valid JSON; that is
//! the normalizer's problem.

pub mod gemini;
pub mod prompt;

use crate::ledger::{Contact, LogEntry};
use crate::state::ConversationContext;
use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiClassifier;
pub use prompt::{build_prompt, format_local_date};

/// Everything the classifier sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub text: &'a str,
    pub contact_names: &'a [String],
    /// Full details of the active roster, used to answer queries.
    pub contacts: &'a [Contact],
    pub pending_context: Option<&'a ConversationContext>,
    /// The user's local date, e.g. "Tuesday, February 17, 2026".
    pub local_date: &'a str,
    /// Most recent first.
    pub recent_logs: &'a [LogEntry],
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<String>;
}
