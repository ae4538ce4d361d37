//! Remote tool registry and data message classification
//!
//! Tools registered here are callable by the remote agent over the
//! transport's RPC channel. Argument binding is by parameter name
//! against the declared schema; a missing argument is passed as JSON
//! null and whatever the tool does with it is its own responsibility
//! (the registry does not validate before calling). A failing tool
//! call returns `{"error": message}` to the caller and never takes
//! down the registry or the session.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::event::SessionEvent;
use voxlink_core::VoxlinkError;

/// One declared parameter of a tool
#[derive(Debug, Clone)]
pub struct ToolParameter {
    /// Parameter name, used to bind arguments
    pub name: String,
    /// Human-readable description for the agent
    pub description: String,
    /// Whether the agent is expected to always supply this parameter
    pub required: bool,
}

impl ToolParameter {
    /// Declare a required parameter
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    /// Declare an optional parameter
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Executable body of a tool
///
/// Arguments arrive in the order the parameters were declared, with
/// JSON null standing in for anything the caller did not supply.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool
    async fn call(&self, args: Vec<Value>) -> Result<Value, VoxlinkError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, VoxlinkError>> + Send,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, VoxlinkError> {
        (self.0)(args).await
    }
}

/// A remotely callable function
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique tool name; registering a duplicate replaces the earlier entry
    pub name: String,
    /// Human-readable description for the agent
    pub description: String,
    /// Declared parameters, in binding order
    pub parameters: Vec<ToolParameter>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Create a tool from a handler implementation
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// Create a tool from an async closure
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        f: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, VoxlinkError>> + Send + 'static,
    {
        Self::new(name, description, parameters, Arc::new(FnHandler(f)))
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Maps registered tools to inbound RPC invocations
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: DashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active tool set
    ///
    /// Tools with an empty name are skipped with a warning.
    pub fn register(&self, tools: Vec<ToolDefinition>) {
        self.tools.clear();
        for tool in tools {
            if tool.name.is_empty() {
                warn!("skipping tool with empty name");
                continue;
            }
            self.tools.insert(tool.name.clone(), tool);
        }
    }

    /// Remove all registered tools
    pub fn clear(&self) {
        self.tools.clear();
    }

    /// Names of the registered tools
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|e| e.key().clone()).collect()
    }

    /// Invoke a tool with already-parsed JSON arguments
    ///
    /// Arguments are bound by name against the declared parameter
    /// order; anything missing binds as null.
    pub async fn dispatch_value(&self, method: &str, arguments: &Value) -> Value {
        let Some(tool) = self.tools.get(method).map(|e| e.value().clone()) else {
            return json!({ "error": format!("unknown tool '{method}'") });
        };
        let args: Vec<Value> = tool
            .parameters
            .iter()
            .map(|p| arguments.get(&p.name).cloned().unwrap_or(Value::Null))
            .collect();
        match tool.handler.call(args).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %method, "tool call failed: {e}");
                json!({ "error": e.to_string() })
            }
        }
    }

    /// Invoke a tool with a raw JSON argument payload
    ///
    /// The result is serialized back to a JSON string for the RPC
    /// response; parse failures come back as `{"error": message}`.
    pub async fn dispatch(&self, method: &str, payload: &str) -> String {
        let arguments: Value = if payload.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(payload) {
                Ok(value) => value,
                Err(e) => {
                    return json!({ "error": format!("invalid argument payload: {e}") })
                        .to_string()
                }
            }
        };
        self.dispatch_value(method, &arguments).await.to_string()
    }
}

#[cfg(feature = "legacy-wire")]
#[async_trait]
impl voxlink_wire::WireToolHandler for ToolRegistry {
    async fn invoke(&self, name: &str, arguments: Value) -> Value {
        self.dispatch_value(name, &arguments).await
    }
}

/// Classify an inbound data message into session events
///
/// Messages carry a `type` discriminator: `answer` and `transcription`
/// become their dedicated events, anything else is re-emitted as a
/// custom event with the original payload and the sender identity.
/// Malformed payloads are dropped after a debug log.
pub fn classify_data(payload: &[u8], sender: &str) -> Vec<SessionEvent> {
    let Ok(text) = std::str::from_utf8(payload) else {
        debug!("dropping non-UTF-8 data message from {sender}");
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        debug!("dropping unparseable data message from {sender}");
        return Vec::new();
    };
    match value.get("type").and_then(Value::as_str) {
        Some("answer") => {
            let text = value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            vec![SessionEvent::Answer { text }]
        }
        Some("transcription") => transcription_events(&value),
        _ => vec![SessionEvent::Custom {
            payload: value,
            sender: sender.to_string(),
        }],
    }
}

/// One event per segment with non-empty text, in arrival order
fn transcription_events(value: &Value) -> Vec<SessionEvent> {
    let segment_event = |segment: &Value| -> Option<SessionEvent> {
        let text = segment.get("text").and_then(Value::as_str)?;
        if text.is_empty() {
            return None;
        }
        Some(SessionEvent::Transcription {
            text: text.to_string(),
            is_final: segment
                .get("final")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    };
    match value.get("segments").and_then(Value::as_array) {
        Some(segments) => segments.iter().filter_map(segment_event).collect(),
        None => segment_event(value).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_tool() -> ToolDefinition {
        ToolDefinition::from_fn(
            "add",
            "Add two numbers",
            vec![
                ToolParameter::required("a", "first addend"),
                ToolParameter::required("b", "second addend"),
            ],
            |args| async move {
                let a = args[0].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                    reason: "a is not a number".to_string(),
                })?;
                let b = args[1].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                    reason: "b is not a number".to_string(),
                })?;
                Ok(json!(a + b))
            },
        )
    }

    #[tokio::test]
    async fn arguments_bind_by_name_in_declared_order() {
        let registry = ToolRegistry::new();
        registry.register(vec![add_tool()]);

        // Argument object order does not matter, binding is by name.
        let result = registry.dispatch("add", r#"{"b":3,"a":2}"#).await;
        assert_eq!(result, "5");
    }

    #[tokio::test]
    async fn missing_argument_binds_as_null() {
        let registry = ToolRegistry::new();
        registry.register(vec![ToolDefinition::from_fn(
            "probe",
            "Report which arguments arrived",
            vec![
                ToolParameter::required("x", ""),
                ToolParameter::optional("y", ""),
            ],
            |args| async move { Ok(json!([args[0].is_null(), args[1].is_null()])) },
        )]);

        let result = registry.dispatch("probe", r#"{"x":"here"}"#).await;
        assert_eq!(result, "[false,true]");
    }

    #[tokio::test]
    async fn tool_failure_returns_a_structured_error() {
        let registry = ToolRegistry::new();
        registry.register(vec![add_tool()]);

        let result = registry.dispatch("add", r#"{"a":"x"}"#).await;
        let value: Value = serde_json::from_str(&result).unwrap();
        assert!(value.get("error").is_some());
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_payload_return_errors() {
        let registry = ToolRegistry::new();
        registry.register(vec![add_tool()]);

        let result = registry.dispatch("subtract", "{}").await;
        assert!(result.contains("unknown tool"));

        let result = registry.dispatch("add", "{broken").await;
        assert!(result.contains("invalid argument payload"));
    }

    #[tokio::test]
    async fn register_replaces_the_active_set() {
        let registry = ToolRegistry::new();
        registry.register(vec![add_tool()]);
        registry.register(vec![ToolDefinition::from_fn(
            "ping",
            "",
            Vec::new(),
            |_| async move { Ok(json!("pong")) },
        )]);

        assert_eq!(registry.names(), vec!["ping".to_string()]);
        assert!(registry.dispatch("add", "{}").await.contains("unknown tool"));
    }

    #[test]
    fn data_messages_classify_by_type() {
        let events = classify_data(br#"{"type":"answer","text":"sure"}"#, "agent");
        assert!(matches!(&events[0], SessionEvent::Answer { text } if text == "sure"));

        let events = classify_data(br#"{"type":"telemetry","value":1}"#, "agent");
        assert!(
            matches!(&events[0], SessionEvent::Custom { sender, .. } if sender == "agent")
        );

        // Malformed payloads are dropped, not errors.
        assert!(classify_data(b"{nope", "agent").is_empty());
        assert!(classify_data(&[0xff, 0xfe], "agent").is_empty());
    }

    #[test]
    fn transcription_segments_emit_per_non_empty_text() {
        let payload = br#"{"type":"transcription","segments":[
            {"text":"hello","final":false},
            {"text":"","final":false},
            {"text":"hello world","final":true}
        ]}"#;
        let events = classify_data(payload, "agent");
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[1], SessionEvent::Transcription { text, is_final: true } if text == "hello world")
        );

        let single = classify_data(br#"{"type":"transcription","text":"hi"}"#, "agent");
        assert_eq!(single.len(), 1);
    }
}
