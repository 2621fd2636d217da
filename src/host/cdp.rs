//! [`HostDocument`] over a live Chrome tab.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{
    EnableParams as PageEnableParams, EventDomContentEventFired, EventFrameNavigated,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::document::{DocResult, HostDocument, Overlay, PageEvent, ReadyState, UiEvent};

/// Runtime binding the injected overlays call with a JSON [`UiEvent`].
pub const BINDING_NAME: &str = "__autoClickEmit";

#[derive(Clone)]
pub struct CdpDocument {
    page: Page,
}

impl CdpDocument {
    /// Install the overlay binding on `page` and start forwarding page
    /// events.
    ///
    /// The returned task ends, dropping the sender, when the tab's event
    /// streams close.
    pub async fn attach(
        page: Page,
    ) -> DocResult<(Self, mpsc::UnboundedReceiver<PageEvent>, JoinHandle<()>)> {
        page.execute(PageEnableParams::default())
            .await
            .map_err(|e| format!("failed to enable Page domain: {e}"))?;
        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(|e| format!("failed to add {BINDING_NAME} binding: {e}"))?;

        let mut bindings = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| format!("failed to attach binding listener: {e}"))?;
        let mut navigations = page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(|e| format!("failed to attach navigation listener: {e}"))?;
        let mut ready = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| format!("failed to attach DOMContentLoaded listener: {e}"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            loop {
                // Navigations first so a queued frameNavigated is delivered
                // ahead of the new document's DOMContentLoaded.
                let event = tokio::select! {
                    biased;
                    Some(ev) = navigations.next() => {
                        if ev.frame.parent_id.is_some() {
                            continue;
                        }
                        PageEvent::Navigated { url: ev.frame.url.clone() }
                    }
                    Some(_) = ready.next() => PageEvent::DocumentReady,
                    Some(ev) = bindings.next() => {
                        if ev.name != BINDING_NAME {
                            continue;
                        }
                        match serde_json::from_str::<UiEvent>(&ev.payload) {
                            Ok(ui) => PageEvent::Ui(ui),
                            Err(err) => {
                                log::warn!("Ignoring malformed overlay payload: {err}");
                                continue;
                            }
                        }
                    }
                    else => break,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            log::debug!("Page event forwarder finished");
        });

        Ok((Self { page }, rx, forwarder))
    }

    async fn eval(&self, expression: String) -> DocResult<Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| format!("evaluate failed: {e}"))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn eval_bool(&self, expression: String) -> DocResult<bool> {
        Ok(self.eval(expression).await?.as_bool().unwrap_or(false))
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script that replaces any node with the overlay's id and wires its
/// buttons to [`BINDING_NAME`].
pub fn insert_overlay_script(overlay: &Overlay) -> String {
    let id = js_string(&overlay.id);
    let tag = js_string(&overlay.tag);
    let style = js_string(&overlay.style);
    let html = overlay
        .html
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());
    let text = js_string(overlay.text.as_deref().unwrap_or(""));
    let fields = serde_json::to_string(&overlay.fields).unwrap_or_else(|_| "[]".to_string());
    let actions: Vec<[&str; 2]> = overlay
        .actions
        .iter()
        .map(|a| [a.element_id.as_str(), a.action.as_str()])
        .collect();
    let actions = serde_json::to_string(&actions).unwrap_or_else(|_| "[]".to_string());
    let binding = js_string(BINDING_NAME);

    format!(
        r#"(() => {{
    const id = {id};
    const existing = document.getElementById(id);
    if (existing) existing.remove();
    const node = document.createElement({tag});
    node.id = id;
    node.style.cssText = {style};
    const html = {html};
    if (html !== null) {{
        node.innerHTML = html;
    }} else {{
        node.textContent = {text};
    }}
    document.body.appendChild(node);
    const fields = {fields};
    const emit = (action) => {{
        const values = {{}};
        for (const fieldId of fields) {{
            const input = node.querySelector('#' + CSS.escape(fieldId));
            values[fieldId] = input ? String(input.value) : '';
        }}
        const send = window[{binding}];
        if (typeof send === 'function') {{
            send(JSON.stringify({{ overlay: id, action, fields: values }}));
        }}
    }};
    for (const [elementId, action] of {actions}) {{
        const target = elementId === id ? node : node.querySelector('#' + CSS.escape(elementId));
        if (target) target.addEventListener('click', () => emit(action));
    }}
    return true;
}})()"#
    )
}

#[async_trait]
impl HostDocument for CdpDocument {
    async fn ready_state(&self) -> DocResult<ReadyState> {
        let value = self.eval("document.readyState".to_string()).await?;
        let text = value.as_str().unwrap_or_default();
        ReadyState::parse(text).ok_or_else(|| format!("unexpected readyState {value}").into())
    }

    async fn has_body(&self) -> DocResult<bool> {
        self.eval_bool("!!document.body".to_string()).await
    }

    async fn current_url(&self) -> DocResult<String> {
        let value = self.eval("window.location.href".to_string()).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click_element(&self, id: &str) -> DocResult<bool> {
        let id = js_string(id);
        self.eval_bool(format!(
            "(() => {{ const el = document.getElementById({id}); if (!el) return false; el.click(); return true; }})()"
        ))
        .await
    }

    async fn insert_overlay(&self, overlay: &Overlay) -> DocResult<()> {
        if !self.eval_bool(insert_overlay_script(overlay)).await? {
            return Err(format!("failed to insert overlay #{}", overlay.id).into());
        }
        Ok(())
    }

    async fn remove_overlay(&self, id: &str) -> DocResult<bool> {
        let id = js_string(id);
        self.eval_bool(format!(
            "(() => {{ const n = document.getElementById({id}); if (!n) return false; n.remove(); return true; }})()"
        ))
        .await
    }

    async fn has_overlay(&self, id: &str) -> DocResult<bool> {
        let id = js_string(id);
        self.eval_bool(format!("!!document.getElementById({id})"))
            .await
    }
}
