use super::ClassifyRequest;
use chrono::NaiveDate;
use std::fmt::Write;

/// Date line handed to the classifier; relative phrases are resolved
/// against it, so it carries the weekday.
pub fn format_local_date(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

const INSTRUCTIONS: &str = r#"Work through these steps in order.

Step 0 (context): if there is a pending conversation, decide whether the new message continues it (a yes/no, a confirmation, a choice between candidates) or starts something new. A confirmation resolves the pending intent. A refusal becomes intent "unknown" with the message "OK, cancelled." Anything unrelated is classified on its own and the pending context is ignored.

Step 1 (intent): choose exactly one of
- log_interaction: recording something that happened with someone ("had coffee with X", "called X"). Use it even for people not yet in the contact list.
- query: asking about a contact ("when did I last talk to X?").
- set_reminder: asking to be reminded about someone ("remind me about X in 2 weeks").
- update_contact: renaming a contact ("rename X to Y").
- archive: removing a contact. Ask for confirmation first: set needs_clarification to true until the user has confirmed.
- onboarding: explicitly adding a brand-new contact. Set needs_clarification to true when a detail must be confirmed first.
- clarify: you cannot tell which contact is meant.
- unknown: greetings, small talk, questions about the bot, or anything you are unsure about.

Step 2 (contact): use the exact canonical name from the contact list.
- A nickname or partial name that fits one contact: match_type "fuzzy" with the canonical name.
- Several contacts fit: match_type "ambiguous" and name is an array of canonical names.
- Not in the list: match_type "new" with the name as the user wrote it.
- No contact involved: match_type "none" and name null.
- Resolve pronouns against the most recent messages.

Step 3 (fields): interaction_date and follow_up_date as YYYY-MM-DD, resolved against the current date, or null when not mentioned. follow_up_date only when the user gives explicit timing. new_name only for update_contact.

Step 4 (reply): write a short, friendly reply. Confirm actions briefly, ask which contact when ambiguous, answer queries from the contact details (not from the recent messages), and include the weekday when mentioning dates.

Return only this JSON object:
{
  "context": {"is_continuation": false, "pending_intent": null},
  "intent": {"value": "log_interaction"},
  "contact": {"name": null, "match_type": "none"},
  "fields": {
    "interaction_date": null,
    "follow_up_date": null,
    "new_name": null,
    "needs_clarification": false
  },
  "response": {"message": "...", "clarification_question": null}
}"#;

/// Render the classifier prompt for one turn.
pub fn build_prompt(request: &ClassifyRequest<'_>) -> String {
    let mut prompt = String::from(
        "You are the language engine for Rolodex, a personal CRM that people text about \
         the people in their lives. Turn the user's message into JSON.\n\n",
    );

    let _ = writeln!(prompt, "Current date: {}\n", request.local_date);

    prompt.push_str("Active contacts:\n");
    prompt.push_str(&contact_list(request));
    prompt.push_str("\n\n");

    match request.pending_context {
        Some(ctx) => {
            let _ = writeln!(
                prompt,
                "Pending context: the user previously said \"{}\" (pending intent: {}; candidates: {}).",
                ctx.original_message,
                ctx.pending_intent,
                if ctx.candidates.is_empty() {
                    "none".to_string()
                } else {
                    ctx.candidates.join(", ")
                }
            );
        }
        None => prompt.push_str("Pending context: none.\n"),
    }
    prompt.push('\n');

    if request.recent_logs.is_empty() {
        prompt.push_str("No recent conversation history.\n");
    } else {
        prompt.push_str("Recent messages (most recent first):\n");
        for log in request.recent_logs {
            let _ = writeln!(
                prompt,
                "- \"{}\" ({}, contact: {})",
                log.raw_message, log.intent, log.contact_name
            );
        }
    }

    let _ = write!(
        prompt,
        "\nUser message: \"\"\"{}\"\"\"\n\n{}",
        request.text, INSTRUCTIONS
    );
    prompt
}

fn contact_list(request: &ClassifyRequest<'_>) -> String {
    if !request.contacts.is_empty() {
        return request
            .contacts
            .iter()
            .map(|c| {
                let mut line = format!("- {}", c.name);
                if let Some(date) = c.last_contact_date {
                    let _ = write!(line, " | last contact: {date}");
                }
                if let Some(message) = &c.last_interaction_message {
                    let _ = write!(line, " | last message: {message}");
                }
                if let Some(date) = c.reminder_date {
                    let _ = write!(line, " | reminder: {date}");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n");
    }
    if request.contact_names.is_empty() {
        return "- (no contacts yet)".to_string();
    }
    request
        .contact_names
        .iter()
        .map(|name| format!("- {name}"))
        .collect::<Vec<_>>()
        .join("\n")
}
