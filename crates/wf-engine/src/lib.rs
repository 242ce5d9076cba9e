//! Flow Execution Engine
//!
//! The stateful interpreter that advances a session across its flow graph:
//! parses and validates graph documents, expands templated strings against
//! the session context, evaluates condition expressions in a closed sandbox,
//! drives node transitions until the flow suspends or terminates, and
//! persists progress through the Store after every transition.

pub mod engine;
pub mod expr;
pub mod gate;
pub mod graph;
pub mod template;

pub use engine::{
    Engine, EngineError, ExecuteOutcome, ExecutionInput, InboundMeta, InteractiveMeta,
};
pub use gate::SessionGate;
pub use graph::{Graph, GraphError, Node, NodeData};
