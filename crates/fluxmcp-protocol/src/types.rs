//! MCP data types: capabilities, catalog entities, content, and the
//! sampling/elicitation payloads exchanged with the server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Information about this client, sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Optional human-facing title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Capabilities the client advertises to the server during `initialize`.
/// Each field is `Some` only when the corresponding feature is enabled in
/// [`crate::Error`]-free client configuration (roots present, sampling
/// backend installed, elicitation handler installed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
}

/// Client roots capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Client sampling capability (currently an empty marker object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingCapability {}

/// Client elicitation capability (currently an empty marker object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElicitationCapability {}

/// Immutable snapshot of server capabilities, parsed from the `initialize`
/// response and held for the life of a session.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    pub tools_list: bool,
    pub tools_list_changed: bool,
    pub resources_list: bool,
    pub resources_list_changed: bool,
    pub resources_subscribe: bool,
    pub prompts_list: bool,
    pub prompts_list_changed: bool,
    pub completions: bool,
    pub logging: bool,
}

impl ServerCapabilities {
    /// Parse from the raw `capabilities` object in an `initialize` response.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        let has = |path: &[&str]| -> bool {
            let mut cur = value;
            for key in path {
                match cur.get(key) {
                    Some(v) => cur = v,
                    None => return false,
                }
            }
            true
        };
        let flag = |path: &[&str]| -> bool {
            let mut cur = value;
            for key in path {
                match cur.get(key) {
                    Some(v) => cur = v,
                    None => return false,
                }
            }
            cur.as_bool().unwrap_or(false)
        };

        Self {
            tools_list: has(&["tools"]),
            tools_list_changed: flag(&["tools", "listChanged"]),
            resources_list: has(&["resources"]),
            resources_list_changed: flag(&["resources", "listChanged"]),
            resources_subscribe: flag(&["resources", "subscribe"]),
            prompts_list: has(&["prompts"]),
            prompts_list_changed: flag(&["prompts", "listChanged"]),
            completions: has(&["completions"]),
            logging: has(&["logging"]),
        }
    }
}

/// Result of a successful `initialize` call.
#[derive(Debug, Clone)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------
// Catalog entities
// ---------------------------------------------------------------------

/// A tool the server exposes for invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// A resource the server exposes for reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A URI template describing a parameterized family of resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplate {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A single declared argument of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A reusable prompt template the server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

/// Content returned by a tool call, resource read, or prompt render.
///
/// The spec leaves the representation of tool results as an open question
/// ("sometimes plain text, sometimes a Content record"); this client always
/// normalizes to this tagged variant so callers never branch on format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContents,
    },
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        name: String,
    },
}

/// Either the text or binary body of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Result of `tools/call`: content plus the tool-level error flag.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub content: Vec<Content>,
    pub is_error: bool,
}

impl ToolCallOutcome {
    /// Collapse `is_error: true` into [`crate::Error::ExecutionError`] (spec
    /// §7: "tool result has `isError:true`; surfaced as `{error:\"Tool
    /// execution error: …\"}`"), for hosts that want tool failures to flow
    /// through the same `Result` plumbing as every other error kind instead
    /// of inspecting `is_error` themselves.
    pub fn into_result(self) -> crate::Result<Vec<Content>> {
        if self.is_error {
            let message = self
                .content
                .iter()
                .filter_map(|c| match c {
                    Content::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            Err(crate::Error::ExecutionError(message))
        } else {
            Ok(self.content)
        }
    }
}

// ---------------------------------------------------------------------
// Paginated list envelopes
// ---------------------------------------------------------------------

/// One page of a paginated `…/list` response: items plus an optional opaque
/// cursor for the next page. There is one struct per entity kind rather than
/// a generic envelope because each response names its array field
/// differently (`tools`, `resources`, `resourceTemplates`, `prompts`); the
/// shared shape lives in [`extract_page`] instead.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Pull a named array field (`"tools"`, `"resources"`, ...) and the sibling
/// `nextCursor` out of a raw list-response JSON value.
pub fn extract_page<T: for<'de> Deserialize<'de>>(
    value: serde_json::Value,
    field: &str,
) -> crate::Result<Page<T>> {
    let items = value
        .get(field)
        .cloned()
        .ok_or_else(|| crate::Error::invalid_format(format!("list response missing `{field}`")))?;
    let items: Vec<T> = serde_json::from_value(items)?;
    let next_cursor = value
        .get("nextCursor")
        .and_then(|c| c.as_str())
        .map(str::to_owned);
    Ok(Page { items, next_cursor })
}

// ---------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------

/// One message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: SamplingRole,
    pub content: SamplingContent,
}

/// Speaker of a sampling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingRole {
    User,
    Assistant,
}

/// Content of a sampling message (text or image, per MCP's sampling spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplingContent {
    Text { text: String },
    Image { data: String, #[serde(rename = "mimeType")] mime_type: String },
}

/// A hint toward a specific model name (non-binding, best-effort).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHint {
    pub name: String,
}

/// The server's stated priorities and hints for model selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPreferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ModelHint>,
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    #[serde(rename = "intelligencePriority", skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// Parsed `sampling/createMessage` request params.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    pub messages: Vec<SamplingMessage>,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(rename = "modelPreferences", default)]
    pub model_preferences: ModelPreferences,
}

/// Reply to a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageResult {
    pub role: SamplingRole,
    pub content: SamplingContent,
    pub model: String,
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// One message in a `prompts/get` result. Distinct from [`SamplingMessage`]
/// because prompt content may include resource/resource-link variants that
/// sampling messages do not.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMessage {
    pub role: SamplingRole,
    pub content: Content,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptResult {
    #[serde(default)]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Result of `completion/complete`: candidate values for an argument.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResult {
    pub values: Vec<String>,
    pub total: Option<u32>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
}

// ---------------------------------------------------------------------
// Elicitation
// ---------------------------------------------------------------------

/// Parsed `elicitation/create` request params.
#[derive(Debug, Clone, Deserialize)]
pub struct ElicitRequest {
    pub message: String,
    #[serde(rename = "requestedSchema")]
    pub requested_schema: serde_json::Value,
}

/// The outcome of an elicitation, as sent back to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ElicitResult {
    Accept { content: serde_json::Value },
    Decline,
    Cancel,
}

// ---------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------

/// A filesystem path or URI the client advertises as accessible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------
// Progress / logging notifications
// ---------------------------------------------------------------------

/// A `notifications/progress` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Progress {
    #[serde(rename = "progressToken")]
    pub token: serde_json::Value,
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

/// Severity levels for `notifications/message` (MCP logging notifications),
/// ordered least to most severe so the client can gate on a configured
/// minimum level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// A `notifications/message` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub logger: Option<String>,
    pub data: serde_json::Value,
}

/// Extra metadata map attached to requests/results (`_meta`), passed through
/// untouched.
pub type Meta = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_capabilities_parses_nested_flags() {
        let caps = ServerCapabilities::from_value(&serde_json::json!({
            "tools": { "listChanged": true },
            "resources": { "subscribe": true },
        }));
        assert!(caps.tools_list);
        assert!(caps.tools_list_changed);
        assert!(caps.resources_list);
        assert!(caps.resources_subscribe);
        assert!(!caps.prompts_list);
    }

    #[test]
    fn extract_page_reads_named_field_and_cursor() {
        let value = serde_json::json!({
            "tools": [{"name": "add", "inputSchema": {}}],
            "nextCursor": "c1",
        });
        let page: Page<Tool> = extract_page(value, "tools").unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "add");
        assert_eq!(page.next_cursor.as_deref(), Some("c1"));
    }

    #[test]
    fn extract_page_without_cursor_means_last_page() {
        let value = serde_json::json!({ "tools": [] });
        let page: Page<Tool> = extract_page(value, "tools").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn tool_call_outcome_into_result_passes_through_success() {
        let outcome = ToolCallOutcome {
            content: vec![Content::Text { text: "3".to_string() }],
            is_error: false,
        };
        let content = outcome.into_result().unwrap();
        assert_eq!(content.len(), 1);
    }

    #[test]
    fn tool_call_outcome_into_result_maps_error_flag_to_execution_error() {
        let outcome = ToolCallOutcome {
            content: vec![Content::Text {
                text: "division by zero".to_string(),
            }],
            is_error: true,
        };
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, crate::Error::ExecutionError(msg) if msg == "division by zero"));
    }

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Warning);
        assert!(LogLevel::Emergency > LogLevel::Critical);
    }
}
