use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

pub type DocResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// `document.readyState` of the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "loading" => Some(Self::Loading),
            "interactive" => Some(Self::Interactive),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    /// Whether the DOM is parsed far enough to bootstrap.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Interactive | Self::Complete)
    }
}

/// A button inside an overlay that reports back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayAction {
    pub element_id: String,
    pub action: String,
}

/// A fixed-position node injected into the host page.
///
/// Inserting an overlay whose `id` is already present replaces the old node,
/// along with every listener attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub id: String,
    pub tag: String,
    pub style: String,
    /// Inner markup for container overlays.
    pub html: Option<String>,
    /// Plain text content; used when `html` is `None`.
    pub text: Option<String>,
    pub actions: Vec<OverlayAction>,
    /// Input element ids whose current values travel with every action.
    pub fields: Vec<String>,
}

/// An action reported by an overlay button.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UiEvent {
    pub overlay: String,
    pub action: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl UiEvent {
    pub fn field(&self, id: &str) -> &str {
        self.fields.get(id).map(String::as_str).unwrap_or("")
    }
}

/// Everything the controller reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The main frame committed a new document.
    Navigated { url: String },
    /// DOMContentLoaded fired for the current document.
    DocumentReady,
    Ui(UiEvent),
}

/// The page the clicker runs inside.
#[async_trait]
pub trait HostDocument: Send + Sync {
    async fn ready_state(&self) -> DocResult<ReadyState>;

    async fn has_body(&self) -> DocResult<bool>;

    async fn current_url(&self) -> DocResult<String>;

    /// Activate the element with `id`. Returns `false` when no such element
    /// exists.
    async fn click_element(&self, id: &str) -> DocResult<bool>;

    async fn insert_overlay(&self, overlay: &Overlay) -> DocResult<()>;

    /// Remove the overlay node. Returns `false` when it was not present.
    async fn remove_overlay(&self, id: &str) -> DocResult<bool>;

    async fn has_overlay(&self, id: &str) -> DocResult<bool>;
}
