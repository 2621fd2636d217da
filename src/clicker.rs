use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{ConfigStore, Configuration};
use crate::document::{HostDocument, PageEvent};
use crate::popup::{Popup, PopupCommand};
use crate::scheduler::ClickScheduler;
use crate::url_filter::UrlFilter;

const BODY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the current document to become ready.
    AwaitingReady,
    Initialized,
    /// The current page is outside the URL filter.
    Skipped,
}

/// Top-level controller for one browser tab.
///
/// Owns the configuration and is its only writer. Events are handled one at
/// a time, so a save always finishes persisting before the scheduler is
/// re-evaluated.
pub struct AutoClicker {
    document: Arc<dyn HostDocument>,
    store: ConfigStore,
    popup: Popup,
    scheduler: ClickScheduler,
    filter: UrlFilter,
    config: Configuration,
    phase: Phase,
}

impl AutoClicker {
    pub fn new(document: Arc<dyn HostDocument>, store: ConfigStore, filter: UrlFilter) -> Self {
        Self {
            popup: Popup::new(document.clone()),
            scheduler: ClickScheduler::new(document.clone()),
            document,
            store,
            filter,
            config: Configuration::default(),
            phase: Phase::AwaitingReady,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_clicking(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Handle a fresh page load: bootstrap now if the DOM is ready enough,
    /// otherwise on the next [`PageEvent::DocumentReady`].
    pub async fn start(&mut self) {
        self.phase = Phase::AwaitingReady;
        match self.document.ready_state().await {
            Ok(state) if state.is_ready() => self.initialize().await,
            Ok(state) => log::info!("Document is {state:?}; waiting for DOMContentLoaded"),
            Err(err) => log::warn!("Could not read document readyState: {err}"),
        }
    }

    /// Wait for `<body>`, load configuration, add the trigger button and
    /// evaluate the scheduler.
    pub async fn initialize(&mut self) {
        log::info!("Initializing...");
        let url = self.current_url().await;
        if !self.filter.accepts(&url) {
            log::info!("Skipping {url}: excluded by URL filter");
            self.phase = Phase::Skipped;
            return;
        }

        loop {
            match self.document.has_body().await {
                Ok(true) => break,
                Ok(false) => log::info!("DOM not ready, retrying in 100ms"),
                Err(err) => log::warn!("DOM body check failed, retrying in 100ms: {err}"),
            }
            tokio::time::sleep(BODY_POLL_INTERVAL).await;
        }

        self.config = self.store.load().await;
        if let Err(err) = self.popup.render_trigger().await {
            log::error!("Error adding config button: {err}");
        }
        self.scheduler.evaluate_and_start(&self.config, &url).await;
        self.phase = Phase::Initialized;
    }

    pub async fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Navigated { url } => {
                if self.already_bootstrapped().await {
                    log::debug!("{url} already initialized by DOMContentLoaded");
                    return;
                }
                log::info!("Navigated to {url}");
                self.scheduler.stop();
                self.start().await;
            }
            PageEvent::DocumentReady => {
                if self.phase == Phase::AwaitingReady {
                    self.initialize().await;
                }
            }
            PageEvent::Ui(ui) => {
                if self.phase != Phase::Initialized {
                    log::debug!("Ignoring UI event before initialization: {ui:?}");
                    return;
                }
                match PopupCommand::from_event(&ui) {
                    Some(PopupCommand::Open) => {
                        if let Err(err) = self.popup.open(&self.config).await {
                            log::error!("Error opening popup: {err}");
                        }
                    }
                    Some(PopupCommand::Save(config)) => self.save_and_restart(config).await,
                    Some(PopupCommand::Close) => {
                        if let Err(err) = self.popup.close().await {
                            log::error!("Error closing popup: {err}");
                        }
                    }
                    None => log::debug!("Unhandled UI event: {ui:?}"),
                }
            }
        }
    }

    /// Process page events until the sender side goes away.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<PageEvent>) {
        self.start().await;
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        self.scheduler.stop();
        log::info!("Page event stream closed");
    }

    async fn save_and_restart(&mut self, config: Configuration) {
        self.config = config;
        self.store.save(&self.config).await;
        let url = self.current_url().await;
        self.scheduler.evaluate_and_start(&self.config, &url).await;
        if let Err(err) = self.popup.close().await {
            log::error!("Error removing popup: {err}");
        }
    }

    /// A fresh document never has the trigger, so finding it means the
    /// navigation's DOMContentLoaded was handled first.
    async fn already_bootstrapped(&self) -> bool {
        if self.phase != Phase::Initialized {
            return false;
        }
        match self.popup.trigger_present().await {
            Ok(present) => present,
            Err(err) => {
                log::warn!("Could not check for config button: {err}");
                false
            }
        }
    }

    async fn current_url(&self) -> String {
        match self.document.current_url().await {
            Ok(url) => url,
            Err(err) => {
                log::warn!("Could not read page URL: {err}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{BUTTON_ID_KEY, INTERVAL_KEY, URL_KEY};
    use crate::document::{ReadyState, UiEvent};
    use crate::popup::{
        BUTTON_ID_INPUT_ID, INTERVAL_INPUT_ID, POPUP_ID, TRIGGER_ID, URL_INPUT_ID,
    };
    use crate::store::MemoryStore;
    use crate::testing::FakeDocument;
    use serde_json::{json, Value};

    fn clicker_with(
        document: &Arc<FakeDocument>,
        entries: Vec<(&str, Value)>,
    ) -> (AutoClicker, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::with_entries(entries));
        let clicker = AutoClicker::new(
            document.clone(),
            ConfigStore::new(memory.clone()),
            UrlFilter::default(),
        );
        (clicker, memory)
    }

    fn ui(overlay: &str, action: &str, fields: &[(&str, &str)]) -> PageEvent {
        PageEvent::Ui(UiEvent {
            overlay: overlay.to_string(),
            action: action.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_page_bootstraps_immediately() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.add_element("submit");
        let (mut clicker, _) = clicker_with(
            &document,
            vec![(INTERVAL_KEY, json!(2)), (BUTTON_ID_KEY, json!("submit"))],
        );

        clicker.start().await;

        assert_eq!(clicker.phase(), Phase::Initialized);
        assert_eq!(document.overlay_count(TRIGGER_ID), 1);
        assert_eq!(document.clicks("submit"), 1);
        advance_secs(2).await;
        assert_eq!(document.clicks("submit"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_page_waits_for_document_ready_once() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.set_ready_state(ReadyState::Loading);
        let (mut clicker, _) = clicker_with(&document, vec![]);

        clicker.start().await;
        assert_eq!(clicker.phase(), Phase::AwaitingReady);
        assert_eq!(document.inserts(TRIGGER_ID), 0);

        clicker.handle_event(PageEvent::DocumentReady).await;
        clicker.handle_event(PageEvent::DocumentReady).await;
        assert_eq!(clicker.phase(), Phase::Initialized);
        assert_eq!(document.inserts(TRIGGER_ID), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn body_is_polled_until_present() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.delay_body(3);
        let (mut clicker, _) = clicker_with(&document, vec![]);

        clicker.start().await;

        assert_eq!(document.body_polls(), 4);
        assert_eq!(clicker.phase(), Phase::Initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_pages_are_left_alone() {
        let document = Arc::new(FakeDocument::new("about:blank"));
        document.add_element("go");
        let (mut clicker, _) = clicker_with(&document, vec![(BUTTON_ID_KEY, json!("go"))]);

        clicker.start().await;

        assert_eq!(clicker.phase(), Phase::Skipped);
        assert_eq!(document.overlay_count(TRIGGER_ID), 0);
        assert_eq!(document.clicks("go"), 0);
        clicker.handle_event(ui(TRIGGER_ID, "open", &[])).await;
        assert_eq!(document.overlay_count(POPUP_ID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opening_twice_leaves_one_popup() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        let (mut clicker, _) = clicker_with(&document, vec![(URL_KEY, json!("https://x.test"))]);
        clicker.start().await;

        clicker.handle_event(ui(TRIGGER_ID, "open", &[])).await;
        clicker.handle_event(ui(TRIGGER_ID, "open", &[])).await;

        assert_eq!(document.overlay_count(POPUP_ID), 1);
        assert_eq!(document.inserts(POPUP_ID), 2);
        let popup = document.overlay(POPUP_ID).unwrap();
        assert!(popup.html.unwrap().contains(r#"value="https://x.test""#));
    }

    #[tokio::test(start_paused = true)]
    async fn close_keeps_configuration_and_timer() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.add_element("go");
        let (mut clicker, memory) = clicker_with(
            &document,
            vec![(INTERVAL_KEY, json!(1)), (BUTTON_ID_KEY, json!("go"))],
        );
        clicker.start().await;
        let before = memory.snapshot();

        clicker.handle_event(ui(TRIGGER_ID, "open", &[])).await;
        clicker.handle_event(ui(POPUP_ID, "close", &[])).await;

        assert_eq!(document.overlay_count(POPUP_ID), 0);
        assert_eq!(memory.snapshot(), before);
        assert_eq!(clicker.config().element_id, "go");
        assert!(clicker.is_clicking());
    }

    #[tokio::test(start_paused = true)]
    async fn save_persists_restarts_and_closes() {
        let document = Arc::new(FakeDocument::new("https://x.test/app/1"));
        document.add_element("next");
        let (mut clicker, memory) = clicker_with(&document, vec![]);
        clicker.start().await;
        assert!(!clicker.is_clicking());

        clicker.handle_event(ui(TRIGGER_ID, "open", &[])).await;
        clicker
            .handle_event(ui(
                POPUP_ID,
                "save",
                &[
                    (URL_INPUT_ID, " https://x.test/app "),
                    (INTERVAL_INPUT_ID, "-3"),
                    (BUTTON_ID_INPUT_ID, "next"),
                ],
            ))
            .await;

        let snapshot = memory.snapshot();
        assert_eq!(snapshot.get(URL_KEY), Some(&json!("https://x.test/app")));
        assert_eq!(snapshot.get(INTERVAL_KEY), Some(&json!(5)));
        assert_eq!(snapshot.get(BUTTON_ID_KEY), Some(&json!("next")));
        assert_eq!(clicker.config().interval_seconds, 5);
        assert!(clicker.is_clicking());
        assert_eq!(document.clicks("next"), 1);
        assert_eq!(document.overlay_count(POPUP_ID), 0);

        advance_secs(5).await;
        assert_eq!(document.clicks("next"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn save_without_element_id_stops_clicking() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.add_element("go");
        let (mut clicker, _) = clicker_with(
            &document,
            vec![(INTERVAL_KEY, json!(1)), (BUTTON_ID_KEY, json!("go"))],
        );
        clicker.start().await;
        assert!(clicker.is_clicking());

        clicker
            .handle_event(ui(
                POPUP_ID,
                "save",
                &[(URL_INPUT_ID, ""), (INTERVAL_INPUT_ID, "1"), (BUTTON_ID_INPUT_ID, "")],
            ))
            .await;

        assert!(!clicker.is_clicking());
        advance_secs(3).await;
        assert_eq!(document.clicks("go"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_rebootstraps_from_store() {
        let document = Arc::new(FakeDocument::new("https://x.test/a"));
        document.add_element("go");
        let (mut clicker, _) = clicker_with(
            &document,
            vec![
                (URL_KEY, json!("https://x.test/a")),
                (INTERVAL_KEY, json!(1)),
                (BUTTON_ID_KEY, json!("go")),
            ],
        );
        clicker.start().await;
        assert!(clicker.is_clicking());

        document.navigate("https://x.test/b");
        clicker
            .handle_event(PageEvent::Navigated {
                url: "https://x.test/b".to_string(),
            })
            .await;

        assert_eq!(clicker.phase(), Phase::Initialized);
        assert_eq!(document.overlay_count(TRIGGER_ID), 1);
        assert!(!clicker.is_clicking());
        advance_secs(3).await;
        assert_eq!(document.clicks("go"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_signal_before_navigation_bootstraps_once() {
        let document = Arc::new(FakeDocument::new("https://x.test/a"));
        document.set_ready_state(ReadyState::Loading);
        document.add_element("go");
        let (mut clicker, _) = clicker_with(
            &document,
            vec![(INTERVAL_KEY, json!(2)), (BUTTON_ID_KEY, json!("go"))],
        );
        clicker.start().await;
        assert_eq!(clicker.phase(), Phase::AwaitingReady);

        document.navigate("https://x.test/b");
        document.set_ready_state(ReadyState::Interactive);
        clicker.handle_event(PageEvent::DocumentReady).await;
        clicker
            .handle_event(PageEvent::Navigated {
                url: "https://x.test/b".to_string(),
            })
            .await;

        assert_eq!(clicker.phase(), Phase::Initialized);
        assert_eq!(document.inserts(TRIGGER_ID), 1);
        assert_eq!(document.clicks("go"), 1);
        assert!(clicker.is_clicking());
        advance_secs(2).await;
        assert_eq!(document.clicks("go"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_of_same_url_bootstraps_again() {
        let document = Arc::new(FakeDocument::new("https://x.test/a"));
        let (mut clicker, _) = clicker_with(&document, vec![]);
        clicker.start().await;
        assert_eq!(document.inserts(TRIGGER_ID), 1);

        document.navigate("https://x.test/a");
        clicker
            .handle_event(PageEvent::Navigated {
                url: "https://x.test/a".to_string(),
            })
            .await;

        assert_eq!(document.inserts(TRIGGER_ID), 2);
        assert_eq!(document.overlay_count(TRIGGER_ID), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains_events_then_stops() {
        let document = Arc::new(FakeDocument::new("https://x.test/"));
        document.add_element("go");
        let (clicker, memory) = clicker_with(&document, vec![]);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ui(TRIGGER_ID, "open", &[])).unwrap();
        tx.send(ui(
            POPUP_ID,
            "save",
            &[(INTERVAL_INPUT_ID, "2"), (BUTTON_ID_INPUT_ID, "go")],
        ))
        .unwrap();
        drop(tx);

        clicker.run(rx).await;

        assert_eq!(memory.snapshot().get(BUTTON_ID_KEY), Some(&json!("go")));
        assert_eq!(document.clicks("go"), 1);
        advance_secs(4).await;
        assert_eq!(document.clicks("go"), 1);
    }
}
