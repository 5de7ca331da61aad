//! Wire types, JSON-RPC framing, and the error taxonomy shared by every
//! FluxMCP crate.
//!
//! This crate has no transport or async runtime dependency of its own; it is
//! the vocabulary `fluxmcp-transport` and `fluxmcp-client` build on.

mod error;
mod jsonrpc;
mod types;
mod version;

pub use error::{Error, Result, RpcError};
pub use jsonrpc::{Frame, JsonRpcVersion, NotificationFrame, RequestFrame, RequestId, ResponseFrame};
pub use types::{
    ClientCapabilities, CompletionResult, Content, CreateMessageRequest, CreateMessageResult,
    ElicitRequest, ElicitResult, ElicitationCapability, GetPromptResult, Implementation,
    InitializeResult, LogLevel, LogMessage, Meta, ModelHint, ModelPreferences, Page, Progress,
    Prompt, PromptArgument, PromptMessage, Resource, ResourceContents, ResourceTemplate, Root,
    RootsCapability, SamplingCapability, SamplingContent, SamplingMessage, SamplingRole,
    ServerCapabilities, Tool, ToolCallOutcome, extract_page,
};
pub use version::{PREFERRED_VERSION, SUPPORTED_VERSIONS, is_supported};
