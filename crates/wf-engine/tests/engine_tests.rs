//! Engine integration tests
//!
//! Runs real flows over the in-memory store with a recording transport:
//! keyword entry, options pause/resume, condition branching, cycle
//! detection, dead ends, and api-node calls against a mock endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use wf_common::{Contact, Flow, Session, SessionStatus, Tenant};
use wf_engine::{Engine, EngineError, ExecuteOutcome, ExecutionInput};
use wf_store::{MemoryStore, Store};
use wf_transport::{OutboundMessage, SendError, SendReceipt, Transport};

/// Records every send and answers with scripted outcomes.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    /// When set, every send fails with this kind: "transient" | "credential".
    fail_mode: Mutex<Option<&'static str>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, m)| match m {
                OutboundMessage::Text { body } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn set_fail_mode(&self, mode: &'static str) {
        *self.fail_mode.lock() = Some(mode);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        _tenant: &Tenant,
        to: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        match *self.fail_mode.lock() {
            Some("transient") => {
                return Err(SendError::Transient { detail: "boom".to_string() })
            }
            Some("credential") => {
                return Err(SendError::Credential {
                    status: 401,
                    detail: "Invalid OAuth access token".to_string(),
                })
            }
            _ => {}
        }

        let mut sent = self.sent.lock();
        sent.push((to.to_string(), message.clone()));
        Ok(SendReceipt { message_id: format!("wamid.{}", sent.len()), conversation_id: None })
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    transport: Arc<RecordingTransport>,
    engine: Engine,
    tenant: Tenant,
    contact: Contact,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = RecordingTransport::new();
        let engine = Engine::new(store.clone(), transport.clone());
        let tenant = store.seed_tenant(Tenant::new("Acme", "token", "555000"));
        let contact = store.seed_contact(Contact::new(&tenant.id, "5491155551234"));
        Self { store, transport, engine, tenant, contact }
    }

    fn seed_flow(&self, trigger: &str, definition: serde_json::Value) -> Flow {
        self.store
            .seed_flow(Flow::new(&self.tenant.id, "Test flow", trigger, definition))
    }

    async fn session(&self, flow: &Flow) -> Session {
        self.store.upsert_session(&self.contact.id, &flow.id).await.unwrap()
    }

    async fn execute(&self, flow: &Flow, text: &str) -> Result<ExecuteOutcome, EngineError> {
        // Rehydrate so resumed invocations see persisted state.
        let session = self.session(flow).await;
        let session = self.store.session(&session.id).await.unwrap().unwrap();
        self.engine
            .execute(ExecutionInput {
                tenant: self.tenant.clone(),
                contact: self.contact.clone(),
                flow: flow.clone(),
                session,
                text: text.to_string(),
                meta: None,
            })
            .await
    }

    async fn session_status(&self, flow: &Flow) -> SessionStatus {
        let session = self.session(flow).await;
        self.store.session(&session.id).await.unwrap().unwrap().status
    }
}

fn simple_reply_flow() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "t1", "type": "trigger", "data": { "keyword": "hola" } },
            { "id": "m1", "type": "message", "data": { "text": "hola {{ triggerMessage }}" } },
            { "id": "e1", "type": "end", "data": {} },
        ],
        "edges": [
            { "id": "a", "source": "t1", "target": "m1" },
            { "id": "b", "source": "m1", "target": "e1" },
        ],
    })
}

fn options_flow() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "t1", "type": "trigger", "data": { "keyword": "menu" } },
            { "id": "o1", "type": "options", "data": { "text": "¿En qué te ayudo?", "options": ["Soporte", "Ventas"] } },
            { "id": "m0", "type": "message", "data": { "text": "Te paso a soporte" } },
            { "id": "m1", "type": "message", "data": { "text": "Ventas acá" } },
            { "id": "mn", "type": "message", "data": { "text": "No entendí" } },
            { "id": "e0", "type": "end", "data": {} },
            { "id": "e1", "type": "end", "data": {} },
            { "id": "en", "type": "end", "data": {} },
        ],
        "edges": [
            { "id": "a", "source": "t1", "target": "o1" },
            { "id": "b", "source": "o1", "target": "m0", "sourceHandle": "opt-0" },
            { "id": "c", "source": "o1", "target": "m1", "sourceHandle": "opt-1" },
            { "id": "d", "source": "o1", "target": "mn", "sourceHandle": "no-match" },
            { "id": "e", "source": "m0", "target": "e0" },
            { "id": "f", "source": "m1", "target": "e1" },
            { "id": "g", "source": "mn", "target": "en" },
        ],
    })
}

// S1: keyword start, simple reply.
#[tokio::test]
async fn test_keyword_start_simple_reply() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("hola", simple_reply_flow());

    let outcome = fx.execute(&flow, "Hola").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["hola Hola".to_string()]);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Completed);

    // The send left a provider message id on the session's outbound log.
    let session = fx.session(&flow).await;
    let record = fx.store.latest_outbound(&session.id).await.unwrap().unwrap();
    assert_eq!(record.provider_message_id.as_deref(), Some("wamid.1"));
}

#[tokio::test]
async fn test_unmatched_keyword_is_a_no_op() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("hola", simple_reply_flow());

    let outcome = fx.execute(&flow, "buen día").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::NoTriggerMatch);
    assert!(fx.transport.sent().is_empty());
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Active);
}

// S2: options pause and resume, case-insensitive match.
#[tokio::test]
async fn test_options_pause_and_resume() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("menu", options_flow());

    let outcome = fx.execute(&flow, "menu").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Suspended);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Paused);

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].1, OutboundMessage::Buttons { .. }));

    let outcome = fx.execute(&flow, "ventas").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["Ventas acá".to_string()]);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Completed);
}

#[tokio::test]
async fn test_options_no_match_arc() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("menu", options_flow());

    fx.execute(&flow, "menu").await.unwrap();
    let outcome = fx.execute(&flow, "otro").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["No entendí".to_string()]);
}

// S3: condition branches on stored context.
#[tokio::test]
async fn test_condition_branches_on_context() {
    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "check",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "check" } },
                { "id": "a1", "type": "assign", "data": { "key": "n", "value": "5" } },
                { "id": "c1", "type": "condition", "data": { "expression": "Number(context.n) > 3" } },
                { "id": "mb", "type": "message", "data": { "text": "big" } },
                { "id": "ms", "type": "message", "data": { "text": "small" } },
                { "id": "e0", "type": "end", "data": {} },
                { "id": "e1", "type": "end", "data": {} },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "a1" },
                { "id": "b", "source": "a1", "target": "c1" },
                { "id": "c", "source": "c1", "target": "mb", "sourceHandle": "true" },
                { "id": "d", "source": "c1", "target": "ms", "sourceHandle": "false" },
                { "id": "e", "source": "mb", "target": "e0" },
                { "id": "f", "source": "ms", "target": "e1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "check").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["big".to_string()]);
}

#[tokio::test]
async fn test_condition_failure_takes_false_arc() {
    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "check",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "check" } },
                { "id": "c1", "type": "condition", "data": { "expression": "process.exit(0)" } },
                { "id": "mb", "type": "message", "data": { "text": "true arm" } },
                { "id": "ms", "type": "message", "data": { "text": "false arm" } },
                { "id": "e0", "type": "end", "data": {} },
                { "id": "e1", "type": "end", "data": {} },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "c1" },
                { "id": "c", "source": "c1", "target": "mb", "sourceHandle": "true" },
                { "id": "d", "source": "c1", "target": "ms", "sourceHandle": "false" },
                { "id": "e", "source": "mb", "target": "e0" },
                { "id": "f", "source": "ms", "target": "e1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "check").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["false arm".to_string()]);
}

// S6: cycle detection through a goto back to the trigger.
#[tokio::test]
async fn test_cycle_detection_errors_session() {
    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "loop",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "loop" } },
                { "id": "m1", "type": "message", "data": { "text": "a" } },
                { "id": "g1", "type": "goto", "data": { "targetNodeId": "t1" } },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "m1" },
                { "id": "b", "source": "m1", "target": "g1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "loop").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Errored);
    assert_eq!(fx.transport.texts(), vec!["a".to_string()]);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Errored);
}

#[tokio::test]
async fn test_handoff_pauses_and_later_events_not_consumed() {
    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "humano",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "humano" } },
                { "id": "h1", "type": "handoff", "data": { "queue": "soporte" } },
            ],
            "edges": [ { "id": "a", "source": "t1", "target": "h1" } ],
        }),
    );

    let outcome = fx.execute(&flow, "humano").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Suspended);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Paused);

    // While handed off the engine leaves inbound events alone.
    let outcome = fx.execute(&flow, "hola?").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::NotConsumed);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Paused);

    // The queue marker landed in the context for the external system.
    let session = fx.session(&flow).await;
    let session = fx.store.session(&session.id).await.unwrap().unwrap();
    assert_eq!(session.context["handoff"]["queue"], "soporte");
}

#[tokio::test]
async fn test_transient_send_failure_continues_flow() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("hola", simple_reply_flow());
    fx.transport.set_fail_mode("transient");

    let outcome = fx.execute(&flow, "hola").await.unwrap();

    // The message is lost but the flow still completes.
    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Completed);
}

#[tokio::test]
async fn test_credential_failure_aborts_and_leaves_session_active() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("hola", simple_reply_flow());
    fx.transport.set_fail_mode("credential");

    let result = fx.execute(&flow, "hola").await;

    assert!(matches!(result, Err(EngineError::SendAborted(e)) if e.is_credential()));
    // The session stays Active on its current node for a later retry.
    assert_eq!(fx.session_status(&flow).await, SessionStatus::Active);
}

#[tokio::test]
async fn test_invalid_graph_rejects_invocation() {
    let fx = Fixture::new();
    let flow = fx.seed_flow("x", json!({ "nodes": [], "edges": [] }));

    let result = fx.execute(&flow, "x").await;

    assert!(matches!(result, Err(EngineError::InvalidGraph(_))));
}

#[tokio::test]
async fn test_diacritics_match_trigger() {
    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "atención",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "atención" } },
                { "id": "m1", "type": "message", "data": { "text": "hola" } },
                { "id": "e1", "type": "end", "data": {} },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "m1" },
                { "id": "b", "source": "m1", "target": "e1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "ATENCION").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);
}

#[tokio::test]
async fn test_api_node_stores_response_in_context() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customers/5491155551234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Ana" })))
        .expect(1)
        .mount(&server)
        .await;

    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "datos",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "datos" } },
                { "id": "a1", "type": "assign", "data": { "key": "phone", "value": "5491155551234" } },
                { "id": "api", "type": "api", "data": {
                    "url": format!("{}/customers/{{{{ phone }}}}", server.uri()),
                    "method": "GET",
                    "assignTo": "customer",
                } },
                { "id": "m1", "type": "message", "data": { "text": "Hola {{ customer.name }}" } },
                { "id": "e1", "type": "end", "data": {} },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "a1" },
                { "id": "b", "source": "a1", "target": "api" },
                { "id": "c", "source": "api", "target": "m1" },
                { "id": "d", "source": "m1", "target": "e1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "datos").await.unwrap();

    assert_eq!(outcome, ExecuteOutcome::Completed);
    assert_eq!(fx.transport.texts(), vec!["Hola Ana".to_string()]);
}

#[tokio::test]
async fn test_api_node_failure_stores_error_marker() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fx = Fixture::new();
    let flow = fx.seed_flow(
        "datos",
        json!({
            "nodes": [
                { "id": "t1", "type": "trigger", "data": { "keyword": "datos" } },
                { "id": "api", "type": "api", "data": {
                    "url": format!("{}/broken", server.uri()),
                    "method": "GET",
                    "assignTo": "customer",
                } },
                { "id": "e1", "type": "end", "data": {} },
            ],
            "edges": [
                { "id": "a", "source": "t1", "target": "api" },
                { "id": "b", "source": "api", "target": "e1" },
            ],
        }),
    );

    let outcome = fx.execute(&flow, "datos").await.unwrap();
    assert_eq!(outcome, ExecuteOutcome::Completed);

    let session = fx.session(&flow).await;
    let session = fx.store.session(&session.id).await.unwrap().unwrap();
    assert_eq!(session.context["customer"]["error"], "API call failed");
}
