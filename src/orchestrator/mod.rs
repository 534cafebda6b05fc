//! The per-turn state machine.
//!
//! There is no persisted state enum. Each turn rebuilds its state from the
//! idempotency record, the pending batch and the stored context, then routes
//! the classified intent to exactly one action.

pub mod actions;

use crate::batcher::{BatchOutcome, MessageBatcher};
use crate::classifier::{Classifier, ClassifyRequest, format_local_date};
use crate::delivery::{Delivery, Recipient};
use crate::ledger::{Channel, ContactLedger, Directory, UserRecord};
use crate::nlp::{ClassifiedIntent, FALLBACK_MESSAGE, Intent, IntentAction, normalize_response};
use crate::state::{ContextDraft, ConversationContext, StateStore};
use crate::utils::{Clock, local_today, parse_timezone};
use actions::ActionScope;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const GREETING: &str = "Hi! Send me a message like 'Had coffee with Sarah today' to log an interaction, or 'When did I last talk to John?' to query a contact.";
pub const ERROR_REPLY: &str = "Something went wrong. Please try again.";
pub const DEFAULT_RECENT_LOG_LIMIT: usize = 5;

const ASK_WHO_LOGGED: &str = "Who did you mean? I didn't catch a contact name.";
const ASK_WHO_REMINDER: &str = "Who would you like to set a reminder for?";
const ASK_WHO_RENAME: &str = "Who would you like to rename?";

/// One authenticated inbound message, as handed over by a webhook adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: Channel,
    /// Phone number or chat id; also the key for all conversation state.
    pub sender: String,
    pub message_id: String,
    pub text: String,
}

impl InboundMessage {
    fn reply_to(&self) -> Recipient {
        Recipient::new(self.channel, self.sender.clone())
    }
}

/// What happened to a pending context during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextResolution {
    /// No context was stored.
    Absent,
    /// The turn continued the stored context.
    Continued,
    /// The turn started something unrelated; the context was dropped before dispatch.
    DiscardedStale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub intent: Intent,
    pub reply: Option<String>,
    pub context: ContextResolution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The message id was already handled.
    Duplicate,
    Unregistered,
    /// A `/command`, answered with the greeting.
    Command,
    /// A newer message in the batch will run the turn.
    Deferred,
    Completed(TurnSummary),
    /// The turn errored; a generic reply was attempted.
    Failed,
}

pub fn unregistered_reply(channel: Channel, sender: &str) -> String {
    match channel {
        Channel::Sms => "This phone number is not registered with Rolodex.".to_string(),
        Channel::Telegram => format!(
            "This Telegram account is not registered with Rolodex. Your chat ID is: {sender}"
        ),
    }
}

/// Collaborators injected at startup.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub state: Arc<dyn StateStore>,
    pub directory: Arc<dyn Directory>,
    pub ledger: Arc<dyn ContactLedger>,
    pub classifier: Arc<dyn Classifier>,
    pub delivery: Arc<dyn Delivery>,
    pub clock: Arc<dyn Clock>,
}

pub struct Orchestrator {
    deps: OrchestratorDeps,
    batcher: Option<MessageBatcher>,
    recent_log_limit: usize,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            batcher: None,
            recent_log_limit: DEFAULT_RECENT_LOG_LIMIT,
        }
    }

    /// Enable batching. A zero window disables it.
    #[must_use]
    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batcher = (!window.is_zero())
            .then(|| MessageBatcher::new(self.deps.state.clone(), window));
        self
    }

    #[must_use]
    pub fn with_recent_log_limit(mut self, limit: usize) -> Self {
        self.recent_log_limit = limit;
        self
    }

    /// Process one inbound message. Never fails: errors are logged and
    /// answered with a generic reply.
    pub async fn handle(&self, msg: &InboundMessage) -> TurnOutcome {
        match self.run_turn(msg).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "turn failed for {} {} (message {}): {:#}",
                    msg.channel, msg.sender, msg.message_id, e
                );
                if let Err(de) = self.deps.delivery.deliver(&msg.reply_to(), ERROR_REPLY).await {
                    error!("failed to deliver error reply to {}: {:#}", msg.sender, de);
                }
                TurnOutcome::Failed
            }
        }
    }

    async fn run_turn(&self, msg: &InboundMessage) -> Result<TurnOutcome> {
        let state = &self.deps.state;

        if state.is_processed(&msg.message_id).await? {
            info!("duplicate message {}, skipping", msg.message_id);
            return Ok(TurnOutcome::Duplicate);
        }
        state.mark_processed(&msg.message_id).await?;

        let Some(user) = self
            .deps
            .directory
            .get_user_by_identifier(msg.channel, &msg.sender)
            .await?
        else {
            info!("unregistered {} sender {}", msg.channel, msg.sender);
            self.deps
                .delivery
                .deliver(&msg.reply_to(), &unregistered_reply(msg.channel, &msg.sender))
                .await?;
            return Ok(TurnOutcome::Unregistered);
        };

        let text = msg.text.trim();
        if text.starts_with('/') {
            self.deps.delivery.deliver(&msg.reply_to(), GREETING).await?;
            return Ok(TurnOutcome::Command);
        }

        let Some(batcher) = &self.batcher else {
            return self.run_batch(msg, &user, text).await;
        };

        let batch = match batcher.submit(&msg.sender, text, &msg.message_id).await? {
            BatchOutcome::Deferred => return Ok(TurnOutcome::Deferred),
            BatchOutcome::Ready(batch) => batch,
        };
        debug!(
            "running batch of {} message(s) for {}: {:?}",
            batch.message_ids.len(),
            msg.sender,
            batch.message_ids
        );
        self.run_batch(msg, &user, &batch.text).await
    }

    async fn run_batch(
        &self,
        msg: &InboundMessage,
        user: &UserRecord,
        text: &str,
    ) -> Result<TurnOutcome> {
        let deps = &self.deps;
        let user_key = msg.sender.as_str();
        let scope = user.scope_key.as_str();

        let context = deps.state.get_context(user_key).await?;
        let contacts = deps.ledger.list_active_contacts(scope).await?;
        let settings = deps.ledger.get_settings(scope).await?;
        let recent_logs = deps
            .ledger
            .get_recent_logs(scope, self.recent_log_limit)
            .await?;
        let contact_names: Vec<String> = contacts.iter().map(|c| c.name.clone()).collect();

        let tz = parse_timezone(&settings.timezone).unwrap_or_else(|e| {
            warn!("{:#}; using UTC for {}", e, scope);
            chrono_tz::UTC
        });
        let today = local_today(deps.clock.now(), tz);
        let local_date = format_local_date(today);

        let request = ClassifyRequest {
            text,
            contact_names: &contact_names,
            contacts: &contacts,
            pending_context: context.as_ref(),
            local_date: &local_date,
            recent_logs: &recent_logs,
        };
        let mut classified = match deps.classifier.classify(request).await {
            Ok(raw) => normalize_response(&raw),
            Err(e) => {
                warn!("classifier call failed: {:#}", e);
                ClassifiedIntent::fallback(FALLBACK_MESSAGE)
            }
        };
        let intent = classified.intent();
        info!("classified turn for {} as {}", user_key, intent);

        let resolution = match &context {
            None => ContextResolution::Absent,
            Some(ctx) if continues_context(ctx, &classified) => ContextResolution::Continued,
            Some(ctx) => {
                debug!(
                    "dropping stale {} context for {} (new intent {})",
                    ctx.pending_intent, user_key, intent
                );
                deps.state.clear_context(user_key).await?;
                ContextResolution::DiscardedStale
            }
        };

        let action_scope = ActionScope {
            ledger: deps.ledger.as_ref(),
            scope,
            today,
            default_reminder_days: settings.default_reminder_days,
            raw_message: text,
            roster: &contacts,
        };
        self.dispatch(&action_scope, user_key, &mut classified).await?;

        let manages_own_context = matches!(
            intent,
            Intent::Clarify | Intent::Archive | Intent::Onboarding
        );
        if resolution == ContextResolution::Continued && !manages_own_context {
            deps.state.clear_context(user_key).await?;
        }

        let reply = classified.reply().map(str::to_string);
        if let Some(reply) = &reply {
            deps.delivery.deliver(&msg.reply_to(), reply).await?;
        }

        Ok(TurnOutcome::Completed(TurnSummary {
            intent,
            reply,
            context: resolution,
        }))
    }

    async fn dispatch(
        &self,
        s: &ActionScope<'_>,
        user_key: &str,
        classified: &mut ClassifiedIntent,
    ) -> Result<()> {
        let state = &self.deps.state;
        let contacts = classified.contacts.clone();

        match classified.action.clone() {
            IntentAction::LogInteraction {
                interaction_date,
                follow_up_date,
            } => {
                if contacts.is_empty() {
                    ask_for_contact(classified, ASK_WHO_LOGGED);
                } else {
                    actions::log_interaction(s, &contacts, interaction_date, follow_up_date)
                        .await?;
                }
            }
            IntentAction::Query => actions::record_query(s, &contacts).await?,
            IntentAction::SetReminder { follow_up_date } => {
                if contacts.is_empty() {
                    ask_for_contact(classified, ASK_WHO_REMINDER);
                } else {
                    actions::set_reminder(s, &contacts, follow_up_date).await?;
                }
            }
            IntentAction::UpdateContact { new_name } => match (contacts.first(), new_name) {
                (None, _) => ask_for_contact(classified, ASK_WHO_RENAME),
                (Some(old), None) => classified.require_clarification(format!(
                    "What would you like to rename {} to?",
                    old.name
                )),
                (Some(_), Some(new_name)) => actions::rename(s, &contacts, &new_name).await?,
            },
            IntentAction::Archive => {
                if classified.needs_clarification {
                    promote_response_to_question(classified);
                    state
                        .store_context(user_key, draft(Intent::Archive, s.raw_message, classified))
                        .await?;
                } else {
                    actions::archive(s, &contacts).await?;
                    state.clear_context(user_key).await?;
                }
            }
            IntentAction::Onboarding {
                interaction_date,
                follow_up_date,
            } => {
                if classified.needs_clarification {
                    promote_response_to_question(classified);
                    state
                        .store_context(
                            user_key,
                            draft(Intent::Onboarding, s.raw_message, classified),
                        )
                        .await?;
                } else {
                    actions::onboard(s, &contacts, interaction_date, follow_up_date).await?;
                    state.clear_context(user_key).await?;
                }
            }
            IntentAction::Clarify => {
                promote_response_to_question(classified);
                state
                    .store_context(user_key, draft(Intent::Clarify, s.raw_message, classified))
                    .await?;
            }
            IntentAction::Unknown => {}
        }
        Ok(())
    }
}

/// A stored context is continued, not stale, when the new turn carries the
/// same intent (a confirmation differs only in its clarification flag), is
/// itself a clarification, or answers a clarification by naming one of its
/// candidates.
pub fn continues_context(ctx: &ConversationContext, classified: &ClassifiedIntent) -> bool {
    let intent = classified.intent();
    if intent == ctx.pending_intent || intent == Intent::Clarify {
        return true;
    }
    ctx.pending_intent == Intent::Clarify
        && classified
            .contacts
            .iter()
            .any(|c| ctx.candidates.iter().any(|cand| cand == &c.name))
}

fn ask_for_contact(classified: &mut ClassifiedIntent, canned: &str) {
    let question = classified
        .response_message
        .clone()
        .unwrap_or_else(|| canned.to_string());
    classified.require_clarification(question);
}

/// Confirmation prompts often arrive as the plain response message.
fn promote_response_to_question(classified: &mut ClassifiedIntent) {
    classified.needs_clarification = true;
    if classified.clarification_question.is_none() {
        classified
            .clarification_question
            .clone_from(&classified.response_message);
    }
}

fn draft(intent: Intent, original_message: &str, classified: &ClassifiedIntent) -> ContextDraft {
    ContextDraft {
        pending_intent: intent,
        original_message: original_message.to_string(),
        candidates: classified.contact_names(),
    }
}
