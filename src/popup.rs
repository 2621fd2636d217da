//! The two overlays injected into the host page: the always-present trigger
//! button and the configuration popup it opens.

use std::sync::Arc;

use crate::config::Configuration;
use crate::document::{DocResult, HostDocument, Overlay, OverlayAction, UiEvent};

pub const TRIGGER_ID: &str = "autoClickConfigButton";
pub const POPUP_ID: &str = "autoClickPopup";

pub const URL_INPUT_ID: &str = "urlInput";
pub const INTERVAL_INPUT_ID: &str = "intervalInput";
pub const BUTTON_ID_INPUT_ID: &str = "buttonIdInput";
pub const SAVE_BUTTON_ID: &str = "saveBtn";
pub const CLOSE_BUTTON_ID: &str = "closeBtn";

const OPEN_ACTION: &str = "open";
const SAVE_ACTION: &str = "save";
const CLOSE_ACTION: &str = "close";

const TRIGGER_STYLE: &str = "position: fixed; bottom: 20px; right: 20px; z-index: 10000; \
    padding: 10px 15px; background: #007BFF; color: #fff; border: none; \
    border-radius: 5px; font-size: 16px; cursor: pointer;";

const POPUP_STYLE: &str = "position: fixed; top: 20px; right: 20px; width: 300px; padding: 15px; \
    background: #fff; border: 2px solid #333; box-shadow: 0 0 15px rgba(0,0,0,0.5); \
    z-index: 10000; font-family: Arial, sans-serif; font-size: 16px;";

/// What an overlay button asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupCommand {
    Open,
    /// Save & Start, with the form already trimmed and coerced.
    Save(Configuration),
    Close,
}

impl PopupCommand {
    pub fn from_event(event: &UiEvent) -> Option<Self> {
        match (event.overlay.as_str(), event.action.as_str()) {
            (TRIGGER_ID, OPEN_ACTION) => Some(Self::Open),
            (POPUP_ID, SAVE_ACTION) => Some(Self::Save(Configuration::from_form(
                event.field(URL_INPUT_ID),
                event.field(INTERVAL_INPUT_ID),
                event.field(BUTTON_ID_INPUT_ID),
            ))),
            (POPUP_ID, CLOSE_ACTION) => Some(Self::Close),
            _ => None,
        }
    }
}

pub fn trigger_overlay() -> Overlay {
    Overlay {
        id: TRIGGER_ID.to_string(),
        tag: "button".to_string(),
        style: TRIGGER_STYLE.to_string(),
        html: None,
        text: Some("Config Auto Click".to_string()),
        actions: vec![OverlayAction {
            element_id: TRIGGER_ID.to_string(),
            action: OPEN_ACTION.to_string(),
        }],
        fields: Vec::new(),
    }
}

pub fn popup_overlay(config: &Configuration) -> Overlay {
    let url = escape_attr(&config.target_url_prefix);
    let interval = config.interval_seconds;
    let element_id = escape_attr(&config.element_id);
    let html = format!(
        r#"<h3 style="margin: 0 0 10px;">Auto Click Config</h3>
<label>URL (blank for current): <input type="text" id="{URL_INPUT_ID}" value="{url}" placeholder="e.g., https://example.com" style="width: 100%;"></label><br><br>
<label>Interval (seconds): <input type="number" id="{INTERVAL_INPUT_ID}" value="{interval}" min="1" style="width: 100%;"></label><br><br>
<label>Button ID: <input type="text" id="{BUTTON_ID_INPUT_ID}" value="{element_id}" placeholder="e.g., submit" style="width: 100%;"></label><br><br>
<button id="{SAVE_BUTTON_ID}" style="margin-right: 10px;">Save &amp; Start</button><button id="{CLOSE_BUTTON_ID}">Close</button>"#
    );

    Overlay {
        id: POPUP_ID.to_string(),
        tag: "div".to_string(),
        style: POPUP_STYLE.to_string(),
        html: Some(html),
        text: None,
        actions: vec![
            OverlayAction {
                element_id: SAVE_BUTTON_ID.to_string(),
                action: SAVE_ACTION.to_string(),
            },
            OverlayAction {
                element_id: CLOSE_BUTTON_ID.to_string(),
                action: CLOSE_ACTION.to_string(),
            },
        ],
        fields: vec![
            URL_INPUT_ID.to_string(),
            INTERVAL_INPUT_ID.to_string(),
            BUTTON_ID_INPUT_ID.to_string(),
        ],
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the overlays into a [`HostDocument`].
#[derive(Clone)]
pub struct Popup {
    document: Arc<dyn HostDocument>,
}

impl Popup {
    pub fn new(document: Arc<dyn HostDocument>) -> Self {
        Self { document }
    }

    /// Show the popup pre-filled from `config`, replacing any open one.
    pub async fn open(&self, config: &Configuration) -> DocResult<()> {
        if self.document.remove_overlay(POPUP_ID).await? {
            log::debug!("Replaced existing popup");
        }
        self.document.insert_overlay(&popup_overlay(config)).await?;
        log::info!("Popup appended to DOM");
        Ok(())
    }

    pub async fn close(&self) -> DocResult<()> {
        self.document.remove_overlay(POPUP_ID).await?;
        Ok(())
    }

    /// Whether the current document already carries the trigger button.
    pub async fn trigger_present(&self) -> DocResult<bool> {
        self.document.has_overlay(TRIGGER_ID).await
    }

    pub async fn render_trigger(&self) -> DocResult<()> {
        self.document.insert_overlay(&trigger_overlay()).await?;
        log::info!("Config button added to DOM");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(overlay: &str, action: &str, fields: &[(&str, &str)]) -> UiEvent {
        UiEvent {
            overlay: overlay.to_string(),
            action: action.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn popup_prefills_current_configuration() {
        let overlay = popup_overlay(&Configuration {
            target_url_prefix: "https://a.test/?q=\"x\"&y".to_string(),
            interval_seconds: 7,
            element_id: "go".to_string(),
        });
        let html = overlay.html.unwrap();
        assert!(html.contains(r#"value="https://a.test/?q=&quot;x&quot;&amp;y""#));
        assert!(html.contains(r#"value="7" min="1""#));
        assert!(html.contains(r#"id="buttonIdInput" value="go""#));
        assert_eq!(overlay.fields.len(), 3);
        assert_eq!(overlay.actions.len(), 2);
    }

    #[test]
    fn trigger_is_labelled_button() {
        let overlay = trigger_overlay();
        assert_eq!(overlay.tag, "button");
        assert_eq!(overlay.text.as_deref(), Some("Config Auto Click"));
        assert!(overlay.style.contains("bottom: 20px"));
    }

    #[test]
    fn save_event_coerces_form_values() {
        let command = PopupCommand::from_event(&event(
            POPUP_ID,
            "save",
            &[
                (URL_INPUT_ID, " https://site.com "),
                (INTERVAL_INPUT_ID, "-3"),
                (BUTTON_ID_INPUT_ID, " submit "),
            ],
        ));
        assert_eq!(
            command,
            Some(PopupCommand::Save(Configuration {
                target_url_prefix: "https://site.com".to_string(),
                interval_seconds: 5,
                element_id: "submit".to_string(),
            }))
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert_eq!(PopupCommand::from_event(&event(POPUP_ID, "open", &[])), None);
        assert_eq!(PopupCommand::from_event(&event("other", "save", &[])), None);
        assert_eq!(
            PopupCommand::from_event(&event(TRIGGER_ID, "open", &[])),
            Some(PopupCommand::Open)
        );
        assert_eq!(
            PopupCommand::from_event(&event(POPUP_ID, "close", &[])),
            Some(PopupCommand::Close)
        );
    }
}
