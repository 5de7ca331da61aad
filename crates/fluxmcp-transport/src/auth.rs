//! Authorization seam for the HTTP-based transports (spec §6 `AuthProvider`).
//!
//! OAuth 2.1 itself is out of scope (spec §1 Non-goals): the core only needs
//! a collaborator that can mint request headers and refresh credentials
//! after a 401, grounded in the teacher's layered auth-provider traits
//! (`turbomcp-auth/src/types.rs`) minus the multi-provider registry this
//! client-only workspace has no use for.

use std::collections::HashMap;

use async_trait::async_trait;

/// Mints authorization headers and refreshes credentials on demand. The SSE
/// and streamable-HTTP transports call `authorize` before every request and
/// `refresh` exactly once after a `401`, retrying the request if refresh
/// succeeds.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to attach to the outgoing request body `request` names.
    async fn authorize(&self, request: &serde_json::Value) -> HashMap<String, String>;

    /// Attempt to refresh credentials after a `401`. `true` means the
    /// caller should retry with a fresh `authorize()` call.
    async fn refresh(&self) -> bool;
}
