//! Entity Catalog (spec §4.6): lazily populated, pagination-aware maps of
//! tools/resources/resource-templates/prompts, invalidated by
//! [`crate::notifications::NotificationRouter`]. The `Arc<RwLock<HashMap<..>>>`
//! shape is grounded in the teacher's `client/manager.rs` connection table;
//! the lazy-populate/flush-then-refetch behaviour itself has no teacher
//! analog (the teacher's `list_tools`/`list_resources` hit the wire on every
//! call) and is built to the "unloaded xor fully populated, never partial"
//! invariant the specification calls out explicitly.
//!
//! Each map carries a generation counter bumped by its `flush_*`. A
//! `list_changed` notification racing an in-flight fetch must win (spec §5):
//! the fetch captures the generation before awaiting the server, and only
//! commits its result if nothing flushed in the meantime — otherwise the
//! fetch's caller still gets its snapshot, but the cache itself is left
//! empty for the next reader to re-fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use fluxmcp_protocol::{Prompt, Resource, ResourceContents, ResourceTemplate, Result, Tool};
use tracing::debug;

use crate::coordinator::Coordinator;

/// One of the four catalog maps: `None` means unloaded, `Some(_)` means a
/// pagination run completed and every entry is present (spec §3: "Catalog
/// maps are either empty (unloaded) or fully populated... a partial result
/// is never exposed").
type EntityMap<T> = RwLock<Option<HashMap<String, T>>>;

/// Owns the four entity maps plus the per-resource content cache. Holds an
/// `Arc<Coordinator>` rather than owning it, per spec §3's ownership note
/// ("the Catalog shares references to the Session... but does not own it").
pub struct Catalog {
    coordinator: Arc<Coordinator>,
    tools: EntityMap<Tool>,
    tools_generation: AtomicU64,
    resources: EntityMap<Resource>,
    resources_generation: AtomicU64,
    resource_templates: EntityMap<ResourceTemplate>,
    resource_templates_generation: AtomicU64,
    prompts: EntityMap<Prompt>,
    prompts_generation: AtomicU64,
    resource_content: DashMap<String, Vec<ResourceContents>>,
}

impl Catalog {
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            tools: RwLock::new(None),
            tools_generation: AtomicU64::new(0),
            resources: RwLock::new(None),
            resources_generation: AtomicU64::new(0),
            resource_templates: RwLock::new(None),
            resource_templates_generation: AtomicU64::new(0),
            prompts: RwLock::new(None),
            prompts_generation: AtomicU64::new(0),
            resource_content: DashMap::new(),
        }
    }

    /// `client.tools()` (spec §4.7): populate on first call or when
    /// `refresh` is set, otherwise return the cached snapshot untouched
    /// (spec §8: "calling `client.tools()` twice without refresh performs
    /// exactly one `tools/list` round-trip").
    pub async fn tools(&self, refresh: bool) -> Result<Vec<Tool>> {
        if !self.coordinator.capabilities().tools_list {
            return Ok(Vec::new());
        }
        if refresh {
            self.flush_tools();
        }
        if let Some(map) = self.tools.read().expect("poisoned").as_ref() {
            return Ok(map.values().cloned().collect());
        }
        let generation = self.tools_generation.load(Ordering::SeqCst);
        let fetched = self.coordinator.tool_list().await?;
        let map: HashMap<String, Tool> = fetched.into_iter().map(|t| (t.name.clone(), t)).collect();
        let snapshot = map.values().cloned().collect();
        // A `tools/list_changed` may have flushed the cache while this fetch
        // was in flight; the flush always wins (spec §5). Re-check the
        // generation under the same write-lock critical section that would
        // commit the result, so a flush landing between the load above and
        // this lock acquisition still wins.
        let mut guard = self.tools.write().expect("poisoned");
        if self.tools_generation.load(Ordering::SeqCst) == generation {
            *guard = Some(map);
        }
        drop(guard);
        Ok(snapshot)
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Tool> {
        self.tools
            .read()
            .expect("poisoned")
            .as_ref()
            .and_then(|m| m.get(name).cloned())
    }

    /// Empty the tools map; the next read re-fetches from the server. Called
    /// both explicitly (`reset_tools!`) and by
    /// `notifications/tools/list_changed` (spec §4.5).
    pub fn flush_tools(&self) {
        debug!("flushing tools catalog");
        let mut guard = self.tools.write().expect("poisoned");
        self.tools_generation.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }

    pub async fn resources(&self, refresh: bool) -> Result<Vec<Resource>> {
        if !self.coordinator.capabilities().resources_list {
            return Ok(Vec::new());
        }
        if refresh {
            self.flush_resources();
        }
        if let Some(map) = self.resources.read().expect("poisoned").as_ref() {
            return Ok(map.values().cloned().collect());
        }
        let generation = self.resources_generation.load(Ordering::SeqCst);
        let fetched = self.coordinator.resource_list().await?;
        let map: HashMap<String, Resource> =
            fetched.into_iter().map(|r| (r.uri.clone(), r)).collect();
        let snapshot = map.values().cloned().collect();
        let mut guard = self.resources.write().expect("poisoned");
        if self.resources_generation.load(Ordering::SeqCst) == generation {
            *guard = Some(map);
        }
        drop(guard);
        Ok(snapshot)
    }

    #[must_use]
    pub fn resource(&self, uri: &str) -> Option<Resource> {
        self.resources
            .read()
            .expect("poisoned")
            .as_ref()
            .and_then(|m| m.get(uri).cloned())
    }

    pub fn flush_resources(&self) {
        debug!("flushing resources catalog");
        let mut guard = self.resources.write().expect("poisoned");
        self.resources_generation.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }

    /// Gated under the same `resources.list` capability as [`Self::resources`]
    /// — the wire protocol has no distinct advertisement for resource
    /// templates (see `DESIGN.md`).
    pub async fn resource_templates(&self, refresh: bool) -> Result<Vec<ResourceTemplate>> {
        if !self.coordinator.capabilities().resources_list {
            return Ok(Vec::new());
        }
        if refresh {
            self.flush_resource_templates();
        }
        if let Some(map) = self.resource_templates.read().expect("poisoned").as_ref() {
            return Ok(map.values().cloned().collect());
        }
        let generation = self.resource_templates_generation.load(Ordering::SeqCst);
        let fetched = self.coordinator.resource_template_list().await?;
        let map: HashMap<String, ResourceTemplate> = fetched
            .into_iter()
            .map(|t| (t.uri_template.clone(), t))
            .collect();
        let snapshot = map.values().cloned().collect();
        let mut guard = self.resource_templates.write().expect("poisoned");
        if self.resource_templates_generation.load(Ordering::SeqCst) == generation {
            *guard = Some(map);
        }
        drop(guard);
        Ok(snapshot)
    }

    #[must_use]
    pub fn resource_template(&self, uri_template: &str) -> Option<ResourceTemplate> {
        self.resource_templates
            .read()
            .expect("poisoned")
            .as_ref()
            .and_then(|m| m.get(uri_template).cloned())
    }

    pub fn flush_resource_templates(&self) {
        debug!("flushing resource templates catalog");
        let mut guard = self.resource_templates.write().expect("poisoned");
        self.resource_templates_generation.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }

    pub async fn prompts(&self, refresh: bool) -> Result<Vec<Prompt>> {
        if !self.coordinator.capabilities().prompts_list {
            return Ok(Vec::new());
        }
        if refresh {
            self.flush_prompts();
        }
        if let Some(map) = self.prompts.read().expect("poisoned").as_ref() {
            return Ok(map.values().cloned().collect());
        }
        let generation = self.prompts_generation.load(Ordering::SeqCst);
        let fetched = self.coordinator.prompt_list().await?;
        let map: HashMap<String, Prompt> =
            fetched.into_iter().map(|p| (p.name.clone(), p)).collect();
        let snapshot = map.values().cloned().collect();
        let mut guard = self.prompts.write().expect("poisoned");
        if self.prompts_generation.load(Ordering::SeqCst) == generation {
            *guard = Some(map);
        }
        drop(guard);
        Ok(snapshot)
    }

    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<Prompt> {
        self.prompts
            .read()
            .expect("poisoned")
            .as_ref()
            .and_then(|m| m.get(name).cloned())
    }

    pub fn flush_prompts(&self) {
        debug!("flushing prompts catalog");
        let mut guard = self.prompts.write().expect("poisoned");
        self.prompts_generation.fetch_add(1, Ordering::SeqCst);
        *guard = None;
    }

    /// A resource's content, fetched on first call and cached until
    /// [`Self::clear_resource_content`] (spec §4.6 "Per-resource content
    /// cache").
    pub async fn content(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        if let Some(cached) = self.resource_content.get(uri) {
            return Ok(cached.clone());
        }
        let fetched = self.coordinator.read_resource(uri).await?;
        self.resource_content.insert(uri.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Drop the cached content for one resource, so the next [`Self::content`]
    /// call refetches (spec §4.5 `notifications/resources/updated`).
    pub fn clear_resource_content(&self, uri: &str) {
        debug!("clearing cached content for {uri}");
        self.resource_content.remove(uri);
    }

    /// Drop every cached resource's content and all four entity maps; used
    /// by [`crate::client::Client::restart`] after the session is rebuilt.
    pub fn reset_all(&self) {
        self.flush_tools();
        self.flush_resources();
        self.flush_resource_templates();
        self.flush_prompts();
        self.resource_content.clear();
    }

    #[cfg(test)]
    pub(crate) fn seed_tools_for_test(&self, tools: Vec<Tool>) {
        let map = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
        *self.tools.write().expect("poisoned") = Some(map);
    }

    #[cfg(test)]
    pub(crate) fn tools_populated_for_test(&self) -> bool {
        self.tools.read().expect("poisoned").is_some()
    }
}
