//! Execution engine
//!
//! Consumes one inbound event per invocation and drives the session through
//! the graph until it suspends (options, handoff) or terminates (end,
//! dead-end, guard trip). Context and cursor are persisted through the
//! Store before each node executes, so a crash resumes from the last
//! completed transition.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use wf_common::{
    normalize::normalize_keyword, Contact, Flow, MessageRecord, Session, SessionStatus, Tenant,
    WaflowError, API_TIMEOUT_MS, BROADCAST_MAX_BUTTONS, DEFAULT_TRIGGER, MAX_DELAY_MS,
    SAFE_MAX_STEPS,
};
use wf_store::Store;
use wf_transport::{OutboundMessage, ReplyButton, SendError, Transport};

use crate::expr::eval_bool;
use crate::graph::{
    option_handle, ApiData, Graph, GraphError, MessageData, NodeData, OptionsData,
    WhatsappFlowData, HANDLE_FALSE, HANDLE_NO_MATCH, HANDLE_TRUE,
};
use crate::template::{expand, set_path};

/// Interactive reply details of the triggering event.
#[derive(Debug, Clone)]
pub struct InteractiveMeta {
    pub kind: String,
    pub id: String,
    pub title: String,
}

/// Optional metadata of the triggering event.
#[derive(Debug, Clone)]
pub struct InboundMeta {
    pub message_type: String,
    pub raw_text: String,
    pub interactive: Option<InteractiveMeta>,
}

/// A hydrated invocation: the session, its flow graph and contact, and the
/// normalized human-visible text of the triggering event.
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    pub tenant: Tenant,
    pub contact: Contact,
    pub flow: Flow,
    pub session: Session,
    pub text: String,
    pub meta: Option<InboundMeta>,
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Reached an end node or a dead end; session Completed.
    Completed,
    /// Waiting on the next inbound (options or handoff); session Paused.
    Suspended,
    /// Paused on a handoff; the event was not consumed.
    NotConsumed,
    /// No trigger keyword matched; nothing happened.
    NoTriggerMatch,
    /// An internal failure was absorbed; session Errored.
    Errored,
}

/// The only errors callers see. Everything else is absorbed into the
/// session status.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    /// Credential failure from the transport. The session stays Active on
    /// its current node so a retry after credential repair can resume.
    #[error("Send aborted: {0}")]
    SendAborted(SendError),
}

enum StepError {
    SendAborted(SendError),
    Internal(String),
}

impl From<WaflowError> for StepError {
    fn from(e: WaflowError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Cap a delay node's sleep at `MAX_DELAY_MS`.
pub fn effective_delay(seconds: u64) -> Duration {
    Duration::from_millis(seconds.saturating_mul(1000).min(MAX_DELAY_MS))
}

pub struct Engine {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(API_TIMEOUT_MS))
            .build()
            .expect("Failed to build HTTP client");
        Self { store, transport, http }
    }

    /// Advance the session through the graph for one inbound event.
    ///
    /// The caller must serialize invocations per `(contact, flow)`; see
    /// [`crate::SessionGate`].
    pub async fn execute(&self, input: ExecutionInput) -> Result<ExecuteOutcome, EngineError> {
        let graph = Graph::load(&input.flow.definition)?;
        let session_id = input.session.id.clone();

        match self.run(&graph, input).await {
            Ok(outcome) => Ok(outcome),
            Err(StepError::SendAborted(e)) => Err(EngineError::SendAborted(e)),
            Err(StepError::Internal(reason)) => {
                error!(session_id = %session_id, reason = %reason, "Execution failed");
                if let Err(e) = self
                    .store
                    .set_session_status(&session_id, SessionStatus::Errored)
                    .await
                {
                    error!(session_id = %session_id, error = %e, "Failed to mark session errored");
                }
                Ok(ExecuteOutcome::Errored)
            }
        }
    }

    async fn run(&self, graph: &Graph, input: ExecutionInput) -> Result<ExecuteOutcome, StepError> {
        let ExecutionInput { tenant, contact, flow, session, text, meta } = input;

        debug!(
            session_id = %session.id,
            flow_id = %flow.id,
            message_type = meta.as_ref().map(|m| m.message_type.as_str()).unwrap_or("text"),
            "Executing flow"
        );

        let mut context = if session.context.is_object() {
            session.context.clone()
        } else {
            json!({})
        };

        // Entry logic: resume a paused session or match a trigger keyword.
        let mut current: String;
        if session.status == SessionStatus::Paused {
            let paused_node = session
                .current_node_id
                .as_deref()
                .and_then(|id| graph.node(id));
            match paused_node.map(|n| (&n.data, n.id.as_str())) {
                Some((NodeData::Options(data), node_id)) => {
                    match self.resume_options(graph, node_id, data, &text) {
                        Some(target) => {
                            current = target;
                            self.store
                                .set_session_status(&session.id, SessionStatus::Active)
                                .await?;
                        }
                        None => {
                            return self
                                .complete(&session.id, &context, "options dead end")
                                .await;
                        }
                    }
                }
                Some((NodeData::Handoff(_), _)) => {
                    // An external system resumes handoffs; leave the event alone.
                    debug!(session_id = %session.id, "Paused on handoff, not consuming event");
                    return Ok(ExecuteOutcome::NotConsumed);
                }
                _ => match match_trigger(graph, &text) {
                    Some(entry) => {
                        set_path(&mut context, "triggerMessage", json!(text));
                        current = entry;
                    }
                    None => return Ok(ExecuteOutcome::NoTriggerMatch),
                },
            }
        } else {
            match match_trigger(graph, &text) {
                Some(entry) => {
                    set_path(&mut context, "triggerMessage", json!(text));
                    current = entry;
                }
                None => {
                    debug!(session_id = %session.id, "No trigger matched inbound text");
                    return Ok(ExecuteOutcome::NoTriggerMatch);
                }
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut steps: u32 = 0;

        loop {
            steps += 1;
            if steps > SAFE_MAX_STEPS {
                return Err(StepError::Internal(format!(
                    "step guard exceeded after {} transitions",
                    SAFE_MAX_STEPS
                )));
            }
            if !visited.insert(current.clone()) {
                return Err(StepError::Internal(format!("cycle detected at node '{}'", current)));
            }

            let Some(node) = graph.node(&current) else {
                return self.complete(&session.id, &context, "unknown node").await;
            };

            // Durable before the node runs: a crash resumes here.
            self.store
                .save_session_progress(&session.id, Some(&current), &context)
                .await?;

            debug!(session_id = %session.id, node_id = %current, node_type = node.data.type_name(), "Step");

            let next: Option<String> = match &node.data {
                NodeData::Trigger(_) => graph.default_edge(&current).map(|e| e.target.clone()),

                NodeData::Message(data) => {
                    let message = build_message(data, &context);
                    self.send_step(&tenant, &contact, &session.id, message).await?;
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::WhatsappFlow(data) => {
                    let message = build_flow_invite(data, &context);
                    self.send_step(&tenant, &contact, &session.id, message).await?;
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::Options(data) => {
                    let message = build_options(data, &context);
                    self.send_step(&tenant, &contact, &session.id, message).await?;
                    self.store
                        .set_session_status(&session.id, SessionStatus::Paused)
                        .await?;
                    return Ok(ExecuteOutcome::Suspended);
                }

                NodeData::Delay(data) => {
                    tokio::time::sleep(effective_delay(data.seconds)).await;
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::Condition(data) => {
                    let verdict = eval_bool(&data.expression, &context).unwrap_or_else(|e| {
                        warn!(
                            session_id = %session.id,
                            node_id = %current,
                            error = %e,
                            "Condition evaluation failed, taking false arc"
                        );
                        false
                    });
                    let handle = if verdict { HANDLE_TRUE } else { HANDLE_FALSE };
                    graph.edge_by_handle(&current, handle).map(|e| e.target.clone())
                }

                NodeData::Api(data) => {
                    let result = self.call_api(data, &context).await;
                    set_path(&mut context, &data.assign_to, result);
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::Assign(data) => {
                    let value = expand(&data.value, &context);
                    set_path(&mut context, &data.key, json!(value));
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::Media(data) => {
                    let message = OutboundMessage::Media {
                        kind: data.media_type,
                        link: expand(&data.url, &context),
                        caption: data.caption.as_ref().map(|c| expand(c, &context)),
                    };
                    self.send_step(&tenant, &contact, &session.id, message).await?;
                    graph.default_edge(&current).map(|e| e.target.clone())
                }

                NodeData::Handoff(data) => {
                    set_path(
                        &mut context,
                        "handoff",
                        json!({ "queue": data.queue, "note": data.note }),
                    );
                    self.store
                        .save_session_progress(&session.id, Some(&current), &context)
                        .await?;
                    self.store
                        .set_session_status(&session.id, SessionStatus::Paused)
                        .await?;
                    debug!(session_id = %session.id, queue = %data.queue, "Handed off");
                    return Ok(ExecuteOutcome::Suspended);
                }

                NodeData::Goto(data) => {
                    if graph.node(&data.target_node_id).is_some() {
                        Some(data.target_node_id.clone())
                    } else {
                        None
                    }
                }

                NodeData::End(data) => {
                    return self.complete(&session.id, &context, &data.reason).await;
                }
            };

            match next {
                Some(target) => current = target,
                None => return self.complete(&session.id, &context, "dead end").await,
            }
        }
    }

    /// Pick the outbound arc for a reply to a paused options node:
    /// case-insensitive trimmed equality against the declared options, then
    /// the `no-match` arc, then nothing (dead end).
    fn resume_options(
        &self,
        graph: &Graph,
        node_id: &str,
        data: &OptionsData,
        text: &str,
    ) -> Option<String> {
        let reply = text.trim().to_lowercase();
        let matched = data
            .options
            .iter()
            .position(|option| option.trim().to_lowercase() == reply);

        matched
            .and_then(|i| graph.edge_by_handle(node_id, &option_handle(i)))
            .or_else(|| graph.edge_by_handle(node_id, HANDLE_NO_MATCH))
            .map(|e| e.target.clone())
    }

    async fn complete(
        &self,
        session_id: &str,
        context: &Value,
        reason: &str,
    ) -> Result<ExecuteOutcome, StepError> {
        debug!(session_id = %session_id, reason = %reason, "Flow completed");
        self.store.save_session_progress(session_id, None, context).await?;
        self.store
            .set_session_status(session_id, SessionStatus::Completed)
            .await?;
        Ok(ExecuteOutcome::Completed)
    }

    /// Send one outbound message and record it. Credential failures abort
    /// the invocation; transient ones are logged and the flow proceeds.
    async fn send_step(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        session_id: &str,
        message: OutboundMessage,
    ) -> Result<(), StepError> {
        match self.transport.send(tenant, &contact.phone, &message).await {
            Ok(receipt) => {
                let mut record = MessageRecord::outbound(
                    &tenant.id,
                    &contact.id,
                    session_id,
                    message.kind(),
                    message.preview(),
                )
                .with_provider_message_id(&receipt.message_id);
                if let Some(conversation_id) = &receipt.conversation_id {
                    record = record.with_conversation_id(conversation_id);
                }
                self.store.append_message(record).await?;
                Ok(())
            }
            Err(e) if e.is_credential() => Err(StepError::SendAborted(e)),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Outbound send failed, continuing flow"
                );
                Ok(())
            }
        }
    }

    /// Run an `api` node. Failures are never fatal; the error marker is
    /// stored where the response would have gone.
    async fn call_api(&self, data: &ApiData, context: &Value) -> Value {
        match self.try_call_api(data, context).await {
            Ok(value) => value,
            Err(reason) => {
                warn!(url = %data.url, reason = %reason, "API node call failed");
                json!({ "error": "API call failed" })
            }
        }
    }

    async fn try_call_api(&self, data: &ApiData, context: &Value) -> Result<Value, String> {
        let url = expand(&data.url, context);
        let method = reqwest::Method::from_bytes(data.method.as_str().as_bytes())
            .map_err(|e| e.to_string())?;

        let mut request = self.http.request(method, &url);
        let mut has_content_type = false;
        for (name, value) in &data.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            request = request.header(name, expand(value, context));
        }
        if data.method.has_body() && !data.body.is_empty() {
            if !has_content_type {
                request = request.header("Content-Type", "application/json");
            }
            request = request.body(expand(&data.body, context));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let text = response.text().await.map_err(|e| e.to_string())?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Find the entry trigger for the inbound text: exact normalized keyword
/// match first, then a `default` catch-all trigger if the flow has one.
fn match_trigger(graph: &Graph, text: &str) -> Option<String> {
    let normalized = normalize_keyword(text);

    graph
        .trigger_nodes()
        .find(|(_, data)| normalize_keyword(&data.keyword) == normalized)
        .or_else(|| {
            graph
                .trigger_nodes()
                .find(|(_, data)| normalize_keyword(&data.keyword) == DEFAULT_TRIGGER)
        })
        .map(|(node, _)| node.id.clone())
}

fn build_message(data: &MessageData, context: &Value) -> OutboundMessage {
    if data.use_template {
        OutboundMessage::Template {
            name: data.template_name.clone().unwrap_or_default(),
            language: data.template_language.clone().unwrap_or_else(|| "en".to_string()),
            parameters: data
                .template_parameters
                .iter()
                .map(|p| {
                    let mut p = p.clone();
                    p.value = expand(&p.value, context);
                    p
                })
                .collect(),
        }
    } else {
        OutboundMessage::Text { body: expand(&data.text, context) }
    }
}

fn build_options(data: &OptionsData, context: &Value) -> OutboundMessage {
    let mut buttons: Vec<ReplyButton> = data
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| ReplyButton { id: option_handle(i), title: option.clone() })
        .collect();

    if buttons.len() > BROADCAST_MAX_BUTTONS {
        warn!(
            declared = buttons.len(),
            sent = BROADCAST_MAX_BUTTONS,
            "Options exceed the provider button limit, truncating payload"
        );
        buttons.truncate(BROADCAST_MAX_BUTTONS);
    }

    OutboundMessage::Buttons { body: expand(&data.text, context), buttons }
}

fn build_flow_invite(data: &WhatsappFlowData, context: &Value) -> OutboundMessage {
    OutboundMessage::FlowInvite {
        header: data.header.as_ref().map(|h| expand(h, context)),
        body: expand(&data.body, context),
        footer: data.footer.as_ref().map(|f| expand(f, context)),
        cta: expand(&data.cta, context),
        flow_id: data.flow_id.clone(),
        flow_token: data.flow_token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_delay_caps_at_one_minute() {
        assert_eq!(effective_delay(5), Duration::from_secs(5));
        assert_eq!(effective_delay(60), Duration::from_secs(60));
        assert_eq!(effective_delay(3600), Duration::from_secs(60));
    }

    #[test]
    fn test_build_options_truncates_buttons() {
        let data = OptionsData {
            text: "elegí".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        let message = build_options(&data, &json!({}));
        match message {
            OutboundMessage::Buttons { buttons, .. } => {
                assert_eq!(buttons.len(), BROADCAST_MAX_BUTTONS);
                assert_eq!(buttons[0].id, "opt-0");
            }
            other => panic!("expected buttons, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_build_message_expands_template_parameters() {
        let data = MessageData {
            text: String::new(),
            use_template: true,
            template_name: Some("welcome".into()),
            template_language: Some("es_AR".into()),
            template_parameters: vec![wf_transport::TemplateParameter {
                component: "body".into(),
                sub_type: None,
                index: None,
                value: "{{ name }}".into(),
            }],
        };
        let message = build_message(&data, &json!({ "name": "Ana" }));
        match message {
            OutboundMessage::Template { name, parameters, .. } => {
                assert_eq!(name, "welcome");
                assert_eq!(parameters[0].value, "Ana");
            }
            other => panic!("expected template, got {:?}", other.kind()),
        }
    }
}
