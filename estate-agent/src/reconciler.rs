//! Message reconciler.
//!
//! Rewrites the history so every invocation carries its processed record.
//! Messages and invocations keep their positions; records are matched by id,
//! so executor completion order never leaks into the result.

use crate::message::{Message, ToolInvocation};
use crate::protocol::StreamChunk;
use std::collections::{HashMap, HashSet};

/// Replace invocation records in place with their outcomes.
///
/// Invocations without an outcome are left untouched, including those still
/// `awaiting_confirmation` or `rejected`, so the model can react to them.
pub fn reconcile(messages: &[Message], outcomes: &HashMap<String, ToolInvocation>) -> Vec<Message> {
    messages
        .iter()
        .map(|message| {
            let mut message = message.clone();
            for invocation in &mut message.invocations {
                if let Some(outcome) = outcomes.get(&invocation.id) {
                    *invocation = outcome.clone();
                }
            }
            message
        })
        .collect()
}

/// Tool-result chunks for invocations that gained a result this pass, in
/// history order.
pub fn result_chunks(
    messages: &[Message],
    outcomes: &HashMap<String, ToolInvocation>,
) -> Vec<StreamChunk> {
    let mut emitted = HashSet::new();
    let mut chunks = Vec::new();

    for invocation in messages.iter().flat_map(|m| m.invocations.iter()) {
        if invocation.result.is_some() || !emitted.insert(invocation.id.as_str()) {
            continue;
        }
        let Some(outcome) = outcomes.get(&invocation.id) else {
            continue;
        };
        if let Some(result) = &outcome.result {
            chunks.push(StreamChunk::ToolResult {
                id: outcome.id.clone(),
                result: result.clone(),
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::InvocationState;
    use serde_json::json;

    fn history() -> Vec<Message> {
        vec![
            Message::user("weather in Paris and Rome?").with_id("u1"),
            Message::assistant("")
                .with_id("a1")
                .with_invocation(ToolInvocation::proposed("t1", "getWeatherInformation", json!({"city": "Paris"})).awaiting_confirmation())
                .with_invocation(ToolInvocation::proposed("t2", "getWeatherInformation", json!({"city": "Rome"})).awaiting_confirmation())
                .with_invocation(ToolInvocation::proposed("t3", "getLocalTime", json!({"location": "Rome"}))),
            Message::user("confirm t2").with_id("u2"),
        ]
    }

    #[test]
    fn replaces_in_place_and_keeps_order() {
        let original = history();
        let mut outcomes = HashMap::new();
        let t3 = original[1].invocations[2].clone().executed("The local time in Rome is 10:00.");
        let t2 = original[1].invocations[1].clone().executed("The weather in Rome is sunny.");
        outcomes.insert(t3.id.clone(), t3);
        outcomes.insert(t2.id.clone(), t2);

        let reconciled = reconcile(&original, &outcomes);

        let ids: Vec<_> = reconciled.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "a1", "u2"]);
        let inv_ids: Vec<_> = reconciled[1].invocations.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(inv_ids, vec!["t1", "t2", "t3"]);
        assert_eq!(reconciled[1].invocations[0].state, InvocationState::AwaitingConfirmation);
        assert_eq!(reconciled[1].invocations[1].state, InvocationState::Executed);
        assert_eq!(reconciled[1].invocations[2].state, InvocationState::Executed);
        assert_eq!(reconciled[0], original[0]);
    }

    #[test]
    fn result_chunks_follow_history_order() {
        let original = history();
        let mut outcomes = HashMap::new();
        for inv in &original[1].invocations {
            let outcome = match inv.id.as_str() {
                "t1" => inv.clone().awaiting_confirmation(),
                other => inv.clone().executed(format!("result {other}")),
            };
            outcomes.insert(inv.id.clone(), outcome);
        }

        let chunks = result_chunks(&original, &outcomes);
        assert_eq!(
            chunks,
            vec![
                StreamChunk::ToolResult { id: "t2".into(), result: "result t2".into() },
                StreamChunk::ToolResult { id: "t3".into(), result: "result t3".into() },
            ]
        );
    }

    #[test]
    fn already_resolved_invocations_emit_nothing() {
        let done = vec![Message::assistant("").with_invocation(
            ToolInvocation::proposed("t1", "getLocalTime", json!({})).executed("old"),
        )];
        let mut outcomes = HashMap::new();
        outcomes.insert("t1".to_string(), done[0].invocations[0].clone());
        assert!(result_chunks(&done, &outcomes).is_empty());
    }
}
