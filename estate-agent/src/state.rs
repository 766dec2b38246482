//! Conversation state and its reducer.
//!
//! Every change to the history is an explicit [`ConversationEvent`] applied
//! by [`reduce`]. The reducer is pure: ids and timestamps are created when
//! events are constructed, never inside it.

use crate::message::{InvocationState, Message, Role, ToolInvocation};

/// Session-owned conversation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub message_history: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.message_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_history.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.message_history.iter().position(|m| m.id == id)
    }

    /// Stored message matching a re-sent one.
    ///
    /// Falls back to invocation ids for assistant messages, since a client
    /// may hold its own id for a streamed reply.
    fn find_stored(&self, message: &Message) -> Option<usize> {
        self.position(&message.id).or_else(|| {
            if message.role != Role::Assistant || message.invocations.is_empty() {
                return None;
            }
            self.message_history.iter().position(|stored| {
                stored.role == Role::Assistant
                    && message
                        .invocations
                        .iter()
                        .all(|inv| stored.invocation(&inv.id).is_some())
            })
        })
    }
}

/// A state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// Messages sent by the client for this turn. Known messages are not
    /// duplicated.
    MessagesReceived(Vec<Message>),
    /// Reconciled copies of existing messages, replaced by id.
    Reconciled(Vec<Message>),
    /// Final assistant message of a successful turn.
    TurnCompleted(Message),
    /// System note for a scheduled task.
    TaskScheduled(Message),
}

impl ConversationEvent {
    /// Build the event for a scheduled task run.
    pub fn task_scheduled(description: &str) -> Self {
        Self::TaskScheduled(Message::system(format!(
            "Running scheduled task: {description}"
        )))
    }
}

/// Apply one event.
pub fn reduce(mut state: ConversationState, event: ConversationEvent) -> ConversationState {
    match event {
        ConversationEvent::MessagesReceived(messages) => {
            for mut message in messages {
                match state.find_stored(&message) {
                    Some(index) => {
                        adopt_client_decisions(&mut state.message_history[index], &message);
                    }
                    None => {
                        message.invocations = message
                            .invocations
                            .into_iter()
                            .map(ToolInvocation::normalize)
                            .collect();
                        state.message_history.push(message);
                    }
                }
            }
        }
        ConversationEvent::Reconciled(messages) => {
            for message in messages {
                if let Some(index) = state.position(&message.id) {
                    state.message_history[index] = message;
                }
            }
        }
        ConversationEvent::TurnCompleted(message) | ConversationEvent::TaskScheduled(message) => {
            if state.position(&message.id).is_none() {
                state.message_history.push(message);
            }
        }
    }
    state
}

/// Accept typed confirm/reject decisions the client made on a known message.
///
/// Only a pending invocation may move, and only to `confirmed` or
/// `rejected`. Everything else keeps the server copy.
fn adopt_client_decisions(stored: &mut Message, incoming: &Message) {
    for invocation in &mut stored.invocations {
        let pending = matches!(
            invocation.state,
            InvocationState::Proposed | InvocationState::AwaitingConfirmation
        );
        if !pending {
            continue;
        }
        let decision = incoming
            .invocation(&invocation.id)
            .map(|i| i.state)
            .filter(|s| matches!(s, InvocationState::Confirmed | InvocationState::Rejected));
        match decision {
            Some(InvocationState::Confirmed) => *invocation = invocation.clone().confirmed(),
            Some(InvocationState::Rejected) => *invocation = invocation.clone().rejected(),
            _ => {}
        }
    }
}
