//! Roots inbound handler (spec §4.4 "`roots/list`") plus the client-side
//! roots list management supplemented in `SPEC_FULL.md` §C, grounded in the
//! teacher's handler-registration pattern
//! (`turbomcp-client/src/client/operations/handlers.rs`) generalized from a
//! single host-supplied handler object to a plain mutable list, since the
//! spec models roots as client-held configuration rather than a callback.

use std::sync::RwLock;

use fluxmcp_protocol::{RequestId, ResponseFrame, Root, RpcError};

/// Owns the set of local roots advertised to the server. `roots/list`
/// replies with the current set, or a JSON-RPC error if the host has
/// advertised none (spec §4.4: "if the configured roots set is non-empty...
/// otherwise... error").
pub struct RootsComponent {
    roots: RwLock<Vec<Root>>,
}

impl RootsComponent {
    #[must_use]
    pub fn new(initial: Vec<Root>) -> Self {
        Self {
            roots: RwLock::new(initial),
        }
    }

    pub fn add(&self, root: Root) {
        self.roots.write().expect("poisoned").push(root);
    }

    pub fn remove(&self, uri: &str) -> bool {
        let mut roots = self.roots.write().expect("poisoned");
        let before = roots.len();
        roots.retain(|r| r.uri != uri);
        roots.len() != before
    }

    #[must_use]
    pub fn list(&self) -> Vec<Root> {
        self.roots.read().expect("poisoned").clone()
    }

    /// Dispatch one `roots/list` request.
    pub fn handle(&self, id: RequestId) -> ResponseFrame {
        let roots = self.list();
        if roots.is_empty() {
            ResponseFrame::failure(id, RpcError::server_error(-32000, "Roots are not enabled"))
        } else {
            ResponseFrame::success(id, serde_json::json!({ "roots": roots }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roots_is_an_error() {
        let component = RootsComponent::new(Vec::new());
        let response = component.handle(RequestId::Number(1));
        assert_eq!(response.error().unwrap().code, -32000);
    }

    #[test]
    fn non_empty_roots_lists_them() {
        let component = RootsComponent::new(vec![Root {
            uri: "file:///tmp".to_string(),
            name: Some("tmp".to_string()),
        }]);
        let response = component.handle(RequestId::Number(1));
        let result = response.result().unwrap();
        assert_eq!(result["roots"][0]["uri"], "file:///tmp");
    }

    #[test]
    fn add_and_remove_round_trip() {
        let component = RootsComponent::new(Vec::new());
        component.add(Root {
            uri: "file:///a".to_string(),
            name: None,
        });
        assert_eq!(component.list().len(), 1);
        assert!(component.remove("file:///a"));
        assert!(component.list().is_empty());
    }
}
