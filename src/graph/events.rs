//! Events emitted during streaming graph execution.

use super::state::StateMap;
use serde::Serialize;

/// One event in a workflow's execution stream.
///
/// The stream is finite: it ends with either `WorkflowCompleted` or
/// `WorkflowFailed`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    NodeStarted {
        node: String,
    },
    NodeCompleted {
        node: String,
        updates: StateMap,
    },
    NodeFailed {
        node: String,
        error: String,
    },
    StateUpdated {
        state: StateMap,
    },
    WorkflowCompleted {
        state: StateMap,
    },
    WorkflowFailed {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_tags() {
        let event = ExecutionEvent::NodeStarted {
            node: "preprocess".to_string(),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], "node_started");
        assert_eq!(wire["node"], "preprocess");

        let mut state = StateMap::new();
        state.insert("k".to_string(), json!(1));
        let event = ExecutionEvent::WorkflowCompleted { state };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], "workflow_completed");
        assert_eq!(wire["state"]["k"], 1);
    }
}
