use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Configuration;
use crate::document::HostDocument;

/// True when `current_url` is covered by `prefix`. An empty prefix covers
/// every URL; otherwise this is a case-sensitive `starts_with`.
pub fn should_run(prefix: &str, current_url: &str) -> bool {
    prefix.is_empty() || current_url.starts_with(prefix)
}

/// The full gate for starting the click timer.
pub fn start_condition(config: &Configuration, current_url: &str) -> bool {
    should_run(&config.target_url_prefix, current_url)
        && !config.element_id.is_empty()
        && config.interval_seconds > 0
}

/// One lookup-and-click against `element_id`. Never fails; every outcome is
/// logged.
pub async fn attempt(document: &dyn HostDocument, element_id: &str) {
    match document.click_element(element_id).await {
        Ok(true) => {
            let at = chrono::Local::now().format("%H:%M:%S");
            log::info!("Clicked button #{element_id} at {at}");
        }
        Ok(false) => {
            let url = document
                .current_url()
                .await
                .unwrap_or_else(|_| "<unknown>".to_string());
            log::info!("Button #{element_id} not found on {url}");
        }
        Err(err) => {
            log::warn!("Click attempt on #{element_id} failed: {err}");
        }
    }
}

/// Owns the recurring click task. At most one task is alive at a time.
pub struct ClickScheduler {
    document: Arc<dyn HostDocument>,
    active: Option<JoinHandle<()>>,
}

impl ClickScheduler {
    pub fn new(document: Arc<dyn HostDocument>) -> Self {
        Self {
            document,
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abort the active task, if any. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel whatever is running, then start clicking if `config` allows it
    /// on `current_url`.
    ///
    /// The first click happens before this returns; later clicks fire every
    /// `interval_seconds` from then on. Returns whether a task was started.
    pub async fn evaluate_and_start(&mut self, config: &Configuration, current_url: &str) -> bool {
        self.stop();

        if !start_condition(config, current_url) {
            log::info!("Auto-clicking not started - conditions not met");
            return false;
        }

        attempt(self.document.as_ref(), &config.element_id).await;

        let period = Duration::from_secs(config.interval_seconds);
        let document = self.document.clone();
        let element_id = config.element_id.clone();
        let first_tick = Instant::now() + period;
        self.active = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                attempt(document.as_ref(), &element_id).await;
            }
        }));
        log::info!(
            "Auto-clicking started with interval: {}",
            config.interval_seconds
        );
        true
    }
}

impl Drop for ClickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
