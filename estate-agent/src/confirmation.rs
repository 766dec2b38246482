//! Confirmation resolver.
//!
//! Scans the conversation for human confirmation or rejection signals that
//! refer to pending tool invocations. Message text is only a signal; the
//! typed invocation state stays the source of truth.
//!
//! A signal is a line of a user message starting with one of the signal
//! words followed by one or more invocation ids, and nothing else:
//!
//! ```text
//! confirm t1
//! approve t1 t2
//! no, t3
//! ```
//!
//! Every word after the signal word must name a pending invocation, so
//! prose such as "no, t1 looks wrong" is not a signal.
//!
//! A user message consisting only of `Yes, confirmed.` or `No, denied.`
//! applies to every pending invocation of the latest assistant message
//! that proposed tools before it.

use crate::message::{InvocationState, Message, Role};
use std::collections::HashMap;

const CONFIRM_WORDS: &[&str] = &["confirm", "approve", "yes"];
const REJECT_WORDS: &[&str] = &["reject", "deny", "no"];

const APPROVAL_LITERAL: &str = "yes, confirmed.";
const DENIAL_LITERAL: &str = "no, denied.";

/// Resolved status of a pending invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationStatus {
    StillPending,
    Confirmed,
    Rejected,
}

/// A confirm or reject decision parsed from message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub invocation_id: String,
    pub status: ConfirmationStatus,
}

/// Output of [`resolve`]: one status per pending invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    statuses: HashMap<String, ConfirmationStatus>,
}

impl Resolution {
    /// Status for an invocation id. Ids the resolver did not see are pending.
    pub fn status(&self, invocation_id: &str) -> ConfirmationStatus {
        self.statuses
            .get(invocation_id)
            .copied()
            .unwrap_or(ConfirmationStatus::StillPending)
    }

    /// Ids of all pending invocations considered.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.statuses.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Whether an invocation still waits on a human decision.
fn is_pending(state: InvocationState) -> bool {
    matches!(
        state,
        InvocationState::Proposed
            | InvocationState::AwaitingConfirmation
            | InvocationState::Confirmed
    )
}

fn classify(word: &str) -> Option<ConfirmationStatus> {
    let word = word.to_ascii_lowercase();
    if CONFIRM_WORDS.contains(&word.as_str()) {
        Some(ConfirmationStatus::Confirmed)
    } else if REJECT_WORDS.contains(&word.as_str()) {
        Some(ConfirmationStatus::Rejected)
    } else {
        None
    }
}

fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
}

/// Parse the id-addressed signals in a message body, in text order.
///
/// A line is a signal only if every word after the signal word satisfies
/// `is_pending_id`.
pub fn parse_signals(content: &str, is_pending_id: impl Fn(&str) -> bool) -> Vec<Signal> {
    let mut signals = Vec::new();

    for line in content.lines() {
        let mut tokens = line
            .split_whitespace()
            .map(strip_punctuation)
            .filter(|t| !t.is_empty());

        let Some(status) = tokens.next().and_then(classify) else {
            continue;
        };

        let ids: Vec<&str> = tokens.collect();
        if ids.is_empty() || !ids.iter().all(|id| is_pending_id(id)) {
            continue;
        }

        signals.extend(ids.into_iter().map(|id| Signal {
            invocation_id: id.to_string(),
            status,
        }));
    }

    signals
}

/// Recognise the whole-message approval literals.
fn literal_signal(content: &str) -> Option<ConfirmationStatus> {
    let normalized = content.trim().to_ascii_lowercase();
    if normalized == APPROVAL_LITERAL {
        Some(ConfirmationStatus::Confirmed)
    } else if normalized == DENIAL_LITERAL {
        Some(ConfirmationStatus::Rejected)
    } else {
        None
    }
}

/// Resolve every pending invocation in `history`.
///
/// Only user messages after the message owning an invocation can resolve
/// it. Later signals supersede earlier ones.
pub fn resolve(history: &[Message]) -> Resolution {
    // invocation id -> index of owning message
    let mut owners: HashMap<&str, usize> = HashMap::new();
    let mut statuses = HashMap::new();

    for (index, message) in history.iter().enumerate() {
        for invocation in message.invocations.iter().filter(|i| is_pending(i.state)) {
            let initial = if invocation.state == InvocationState::Confirmed {
                ConfirmationStatus::Confirmed
            } else {
                ConfirmationStatus::StillPending
            };
            owners.insert(invocation.id.as_str(), index);
            statuses.insert(invocation.id.clone(), initial);
        }
    }

    if owners.is_empty() {
        return Resolution::default();
    }

    for (index, message) in history.iter().enumerate() {
        if message.role != Role::User {
            continue;
        }

        if let Some(status) = literal_signal(&message.content) {
            let target = history[..index]
                .iter()
                .rposition(|m| m.role == Role::Assistant && !m.invocations.is_empty());
            if let Some(target) = target {
                for (id, _) in owners.iter().filter(|(_, owner)| **owner == target) {
                    statuses.insert((*id).to_string(), status);
                }
            }
            continue;
        }

        for signal in parse_signals(&message.content, |id| owners.contains_key(id)) {
            match owners.get(signal.invocation_id.as_str()) {
                Some(owner) if *owner < index => {
                    tracing::debug!(
                        invocation_id = %signal.invocation_id,
                        status = ?signal.status,
                        "Confirmation signal"
                    );
                    statuses.insert(signal.invocation_id, signal.status);
                }
                _ => {}
            }
        }
    }

    Resolution { statuses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolInvocation;
    use serde_json::json;
    use test_case::test_case;

    fn proposal(id: &str) -> Message {
        Message::assistant("")
            .with_id(format!("a-{id}"))
            .with_invocation(
                ToolInvocation::proposed(id, "getWeatherInformation", json!({"city": "Paris"}))
                    .awaiting_confirmation(),
            )
    }

    #[test_case("confirm t1", ConfirmationStatus::Confirmed ; "confirm")]
    #[test_case("Approve t1", ConfirmationStatus::Confirmed ; "approve mixed case")]
    #[test_case("yes t1!", ConfirmationStatus::Confirmed ; "yes with punctuation")]
    #[test_case("reject t1", ConfirmationStatus::Rejected ; "reject")]
    #[test_case("DENY: t1", ConfirmationStatus::Rejected ; "deny with colon")]
    #[test_case("no t1.", ConfirmationStatus::Rejected ; "no with period")]
    #[test_case("sounds good", ConfirmationStatus::StillPending ; "unrelated text")]
    #[test_case("confirm t2", ConfirmationStatus::StillPending ; "other id")]
    #[test_case("No, t1 looks wrong anyway", ConfirmationStatus::StillPending ; "prose after no")]
    #[test_case("yes t1 is the one I meant", ConfirmationStatus::StillPending ; "prose after yes")]
    fn single_signal(text: &str, expected: ConfirmationStatus) {
        let history = vec![proposal("t1"), Message::user(text)];
        assert_eq!(resolve(&history).status("t1"), expected);
    }

    #[test]
    fn no_signal_stays_pending() {
        let resolution = resolve(&[proposal("t1")]);
        assert_eq!(resolution.len(), 1);
        assert_eq!(resolution.status("t1"), ConfirmationStatus::StillPending);
    }

    #[test]
    fn last_signal_wins() {
        let history = vec![
            proposal("t1"),
            Message::user("confirm t1"),
            Message::assistant("ok"),
            Message::user("reject t1"),
        ];
        assert_eq!(resolve(&history).status("t1"), ConfirmationStatus::Rejected);

        let history = vec![proposal("t1"), Message::user("reject t1\nconfirm t1")];
        assert_eq!(resolve(&history).status("t1"), ConfirmationStatus::Confirmed);
    }

    #[test]
    fn signals_before_the_proposal_do_not_count() {
        let history = vec![Message::user("confirm t1"), proposal("t1")];
        assert_eq!(resolve(&history).status("t1"), ConfirmationStatus::StillPending);
    }

    #[test]
    fn assistant_text_is_not_a_signal() {
        let history = vec![proposal("t1"), Message::assistant("confirm t1")];
        assert_eq!(resolve(&history).status("t1"), ConfirmationStatus::StillPending);
    }

    #[test]
    fn one_line_can_address_several_ids() {
        let message = Message::assistant("")
            .with_invocation(ToolInvocation::proposed("t1", "a", json!({})).awaiting_confirmation())
            .with_invocation(ToolInvocation::proposed("t2", "b", json!({})).awaiting_confirmation());
        let history = vec![message, Message::user("approve t1, t2")];
        let resolution = resolve(&history);
        assert_eq!(resolution.status("t1"), ConfirmationStatus::Confirmed);
        assert_eq!(resolution.status("t2"), ConfirmationStatus::Confirmed);
    }

    #[test]
    fn approval_literal_targets_latest_proposal() {
        let history = vec![
            proposal("t1"),
            Message::user("reject t1"),
            proposal("t2"),
            Message::user("Yes, confirmed."),
        ];
        let resolution = resolve(&history);
        assert_eq!(resolution.status("t1"), ConfirmationStatus::Rejected);
        assert_eq!(resolution.status("t2"), ConfirmationStatus::Confirmed);

        let history = vec![proposal("t3"), Message::user("  no, denied. ")];
        assert_eq!(resolve(&history).status("t3"), ConfirmationStatus::Rejected);
    }

    #[test]
    fn typed_confirmed_state_counts_and_can_be_overridden() {
        let confirmed = Message::assistant("").with_invocation(
            ToolInvocation::proposed("t1", "getWeatherInformation", json!({})).confirmed(),
        );
        assert_eq!(
            resolve(std::slice::from_ref(&confirmed)).status("t1"),
            ConfirmationStatus::Confirmed
        );

        let history = vec![confirmed, Message::user("reject t1")];
        assert_eq!(resolve(&history).status("t1"), ConfirmationStatus::Rejected);
    }

    #[test]
    fn terminal_invocations_are_ignored() {
        let done = Message::assistant("").with_invocation(
            ToolInvocation::proposed("t1", "getWeatherInformation", json!({})).executed("sunny"),
        );
        let history = vec![done, Message::user("reject t1")];
        let resolution = resolve(&history);
        assert!(resolution.is_empty());
    }

    #[test]
    fn parse_signals_in_order() {
        let signals = parse_signals("confirm a b\nhello\nno c\nno way", |id| id.len() == 1);
        let ids: Vec<_> = signals.iter().map(|s| s.invocation_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(signals[2].status, ConfirmationStatus::Rejected);
    }
}
