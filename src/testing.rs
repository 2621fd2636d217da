//! In-process [`HostDocument`] used by the unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::document::{DocResult, HostDocument, Overlay, ReadyState};

#[derive(Default)]
struct FakeState {
    url: String,
    ready_state: Option<ReadyState>,
    body_after_polls: u32,
    body_polls: u32,
    elements: BTreeSet<String>,
    clicks: BTreeMap<String, u32>,
    lookups: BTreeMap<String, u32>,
    fail_clicks: bool,
    overlays: Vec<Overlay>,
    inserts: BTreeMap<String, u32>,
}

pub struct FakeDocument {
    state: Mutex<FakeState>,
}

impl FakeDocument {
    pub fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: url.to_string(),
                ready_state: Some(ReadyState::Complete),
                ..FakeState::default()
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn add_element(&self, id: &str) {
        self.with(|s| s.elements.insert(id.to_string()));
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.with(|s| s.ready_state = Some(state));
    }

    /// `has_body` reports `false` for the first `polls` calls.
    pub fn delay_body(&self, polls: u32) {
        self.with(|s| s.body_after_polls = polls);
    }

    pub fn fail_clicks(&self, fail: bool) {
        self.with(|s| s.fail_clicks = fail);
    }

    pub fn clicks(&self, id: &str) -> u32 {
        self.with(|s| s.clicks.get(id).copied().unwrap_or(0))
    }

    pub fn lookups(&self, id: &str) -> u32 {
        self.with(|s| s.lookups.get(id).copied().unwrap_or(0))
    }

    pub fn body_polls(&self) -> u32 {
        self.with(|s| s.body_polls)
    }

    pub fn overlay_count(&self, id: &str) -> usize {
        self.with(|s| s.overlays.iter().filter(|o| o.id == id).count())
    }

    pub fn overlay(&self, id: &str) -> Option<Overlay> {
        self.with(|s| s.overlays.iter().find(|o| o.id == id).cloned())
    }

    pub fn inserts(&self, id: &str) -> u32 {
        self.with(|s| s.inserts.get(id).copied().unwrap_or(0))
    }

    /// Simulate a navigation: a fresh document without any injected nodes.
    pub fn navigate(&self, url: &str) {
        self.with(|s| {
            s.url = url.to_string();
            s.overlays.clear();
        });
    }
}

#[async_trait]
impl HostDocument for FakeDocument {
    async fn ready_state(&self) -> DocResult<ReadyState> {
        self.with(|s| s.ready_state.ok_or_else(|| "no document".into()))
    }

    async fn has_body(&self) -> DocResult<bool> {
        Ok(self.with(|s| {
            s.body_polls += 1;
            s.body_polls > s.body_after_polls
        }))
    }

    async fn current_url(&self) -> DocResult<String> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn click_element(&self, id: &str) -> DocResult<bool> {
        self.with(|s| {
            *s.lookups.entry(id.to_string()).or_default() += 1;
            if s.fail_clicks {
                return Err("page crashed".into());
            }
            if !s.elements.contains(id) {
                return Ok(false);
            }
            *s.clicks.entry(id.to_string()).or_default() += 1;
            Ok(true)
        })
    }

    async fn insert_overlay(&self, overlay: &Overlay) -> DocResult<()> {
        self.with(|s| {
            s.overlays.retain(|o| o.id != overlay.id);
            s.overlays.push(overlay.clone());
            *s.inserts.entry(overlay.id.clone()).or_default() += 1;
        });
        Ok(())
    }

    async fn remove_overlay(&self, id: &str) -> DocResult<bool> {
        Ok(self.with(|s| {
            let before = s.overlays.len();
            s.overlays.retain(|o| o.id != id);
            s.overlays.len() != before
        }))
    }

    async fn has_overlay(&self, id: &str) -> DocResult<bool> {
        Ok(self.with(|s| s.overlays.iter().any(|o| o.id == id)))
    }
}
