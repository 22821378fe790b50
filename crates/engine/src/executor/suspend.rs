//! In-process approval gate for `suspend` steps.
//!
//! A suspended step registers a waiter keyed by its step id; an approve or
//! reject control releases the oldest waiter for that id. Decisions that arrive
//! before the step suspends are kept and delivered on registration.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a suspended step.
#[derive(Debug, Clone, PartialEq)]
pub enum SuspendDecision {
    Approve(Value),
    Reject(String),
}

#[derive(Debug, Default)]
struct GateState {
    waiting: HashMap<String, VecDeque<oneshot::Sender<SuspendDecision>>>,
    early: HashMap<String, VecDeque<SuspendDecision>>,
}

/// Rendezvous point between suspend steps and run controls.
#[derive(Debug, Default)]
pub struct SuspensionGate {
    state: Mutex<GateState>,
}

impl SuspensionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `step_id` and returns the receiving half.
    pub fn register(&self, step_id: &str) -> oneshot::Receiver<SuspendDecision> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.state.lock().expect("suspension lock");
        if let Some(decision) = state.early.get_mut(step_id).and_then(VecDeque::pop_front) {
            let _ = sender.send(decision);
        } else {
            state.waiting.entry(step_id.to_string()).or_default().push_back(sender);
        }
        receiver
    }

    /// Delivers a decision; returns `true` when a waiting step received it.
    pub fn resolve(&self, step_id: &str, decision: SuspendDecision) -> bool {
        let mut state = self.state.lock().expect("suspension lock");
        let mut decision = decision;
        while let Some(sender) = state.waiting.get_mut(step_id).and_then(VecDeque::pop_front) {
            match sender.send(decision) {
                Ok(()) => return true,
                // The waiter was abandoned (cancelled); try the next one.
                Err(returned) => decision = returned,
            }
        }
        debug!(step_id, "decision arrived before the step suspended; keeping it");
        state.early.entry(step_id.to_string()).or_default().push_back(decision);
        false
    }

    /// Number of steps currently waiting.
    pub fn waiting(&self) -> usize {
        let state = self.state.lock().expect("suspension lock");
        state.waiting.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn releases_a_waiting_step() {
        let gate = SuspensionGate::new();
        let receiver = gate.register("approve");
        assert_eq!(gate.waiting(), 1);

        assert!(gate.resolve("approve", SuspendDecision::Approve(json!({ "by": "ops" }))));
        assert_eq!(receiver.await.expect("decision"), SuspendDecision::Approve(json!({ "by": "ops" })));
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn keeps_early_decisions() {
        let gate = SuspensionGate::new();
        assert!(!gate.resolve("approve", SuspendDecision::Reject("no".into())));

        let receiver = gate.register("approve");
        assert_eq!(receiver.await.expect("decision"), SuspendDecision::Reject("no".into()));
    }
}
