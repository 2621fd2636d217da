pub mod browser;
pub mod cdp;
pub mod profile;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clicker::AutoClicker;
use crate::config::ConfigStore;
use crate::store::{JsonFileStore, KvStore, MemoryStore};
use crate::url_filter::UrlFilter;

/// Configuration for a browser session.
pub struct RunConfig {
    pub start_url: Option<String>,
    pub profile: profile::ProfilePaths,
    pub browser_override: Option<PathBuf>,
    pub store_override: Option<PathBuf>,
    pub headless: bool,
    /// Keep configuration in memory only.
    pub ephemeral: bool,
    pub filter: UrlFilter,
}

impl RunConfig {
    pub fn open_store(&self) -> Arc<dyn KvStore> {
        if self.ephemeral {
            return Arc::new(MemoryStore::new());
        }
        let path = self
            .store_override
            .clone()
            .unwrap_or_else(|| self.profile.store_path.clone());
        Arc::new(JsonFileStore::new(path))
    }
}

const TAB_POLL_INTERVAL: Duration = Duration::from_secs(1);
const TAB_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// The controller and event forwarder running for one tab. Dropping the
/// session stops both, which also cancels the tab's click timer.
struct TabSession {
    clicker: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl TabSession {
    async fn attach(
        page: Page,
        store: Arc<dyn KvStore>,
        filter: UrlFilter,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (document, events, forwarder) = cdp::CdpDocument::attach(page).await?;
        let clicker = AutoClicker::new(Arc::new(document), ConfigStore::new(store), filter);
        Ok(Self {
            clicker: tokio::spawn(clicker.run(events)),
            forwarder,
        })
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        self.clicker.abort();
        self.forwarder.abort();
    }
}

/// Which target ids to attach to and which sessions to drop, given the tabs
/// that are open now.
#[derive(Debug, Default, PartialEq, Eq)]
struct TabSync {
    attach: Vec<String>,
    detach: Vec<String>,
}

/// Sessions for closed tabs, and sessions whose controller already finished,
/// are detached. Every open tab without a live session is attached.
fn plan_tab_sync(attached: &BTreeMap<String, bool>, open: &BTreeSet<String>) -> TabSync {
    let detach: Vec<String> = attached
        .iter()
        .filter(|(id, finished)| **finished || !open.contains(*id))
        .map(|(id, _)| id.clone())
        .collect();
    let attach = open
        .iter()
        .filter(|id| !attached.contains_key(*id) || detach.contains(*id))
        .cloned()
        .collect();
    TabSync { attach, detach }
}

async fn list_pages(browser: &mut Browser) -> Result<Vec<Page>, String> {
    if let Err(err) = browser.fetch_targets().await {
        log::debug!("fetch_targets failed: {err}");
    }
    browser
        .pages()
        .await
        .map_err(|e| format!("failed to list pages: {e}"))
}

/// One [`AutoClicker`] per open tab, keyed by CDP target id.
#[derive(Default)]
struct Tabs {
    sessions: BTreeMap<String, TabSession>,
}

impl Tabs {
    async fn attach(&mut self, page: Page, store: &Arc<dyn KvStore>, filter: &UrlFilter) {
        let target_id = page.target_id().as_ref().to_string();
        match TabSession::attach(page, store.clone(), filter.clone()).await {
            Ok(session) => {
                log::info!("Attached to tab {target_id}");
                self.sessions.insert(target_id, session);
            }
            Err(err) => log::warn!("Could not attach to tab {target_id}: {err}"),
        }
    }

    async fn sync(
        &mut self,
        browser: &mut Browser,
        store: &Arc<dyn KvStore>,
        filter: &UrlFilter,
    ) {
        let pages = match tokio::time::timeout(TAB_QUERY_TIMEOUT, list_pages(browser)).await {
            Ok(Ok(pages)) => pages,
            Ok(Err(err)) => {
                log::warn!("Tab sync skipped: {err}");
                return;
            }
            Err(_) => {
                log::warn!("Tab sync timed out after {}ms", TAB_QUERY_TIMEOUT.as_millis());
                return;
            }
        };
        let mut by_target: BTreeMap<String, Page> = pages
            .into_iter()
            .map(|page| (page.target_id().as_ref().to_string(), page))
            .collect();
        let open: BTreeSet<String> = by_target.keys().cloned().collect();
        let attached: BTreeMap<String, bool> = self
            .sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.clicker.is_finished()))
            .collect();

        let plan = plan_tab_sync(&attached, &open);
        for id in plan.detach {
            log::info!("Detached from tab {id}");
            self.sessions.remove(&id);
        }
        for id in plan.attach {
            if let Some(page) = by_target.remove(&id) {
                self.attach(page, store, filter).await;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Launch a browser and keep an auto clicker attached to every tab until the
/// browser exits, the last tab closes, or the process is interrupted.
pub async fn run_async(config: RunConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let chrome_path = browser::resolve_chrome_binary(config.browser_override.as_deref())?;
    eprintln!("Using browser: {}", chrome_path.display());
    eprintln!("Profile dir: {}", config.profile.browser_dir.display());

    eprintln!("Launching browser...");
    let (mut browser_instance, mut handler_handle) =
        browser::launch_browser(&chrome_path, &config.profile.browser_dir, config.headless).await?;
    eprintln!("Browser launched.");

    let page = browser::open_start_page(&mut browser_instance).await?;
    if let Some(url) = config.start_url.as_deref() {
        eprintln!("Navigating to {url}...");
        page.goto(url)
            .await
            .map_err(|e| format!("goto failed: {e}"))?;
    }

    let store = config.open_store();
    let mut tabs = Tabs::default();
    let first_target = page.target_id().as_ref().to_string();
    let first = TabSession::attach(page, store.clone(), config.filter.clone()).await?;
    tabs.sessions.insert(first_target, first);

    eprintln!("Auto clicker running; close the browser or press Ctrl-C to stop.");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(TAB_POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let browser_exited = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                eprintln!("Interrupted.");
                break false;
            }
            _ = &mut handler_handle => {
                eprintln!("Browser exited.");
                break true;
            }
            _ = poll.tick() => {
                tabs.sync(&mut browser_instance, &store, &config.filter).await;
                if tabs.is_empty() {
                    eprintln!("All tabs closed.");
                    break false;
                }
            }
        }
    };
    drop(tabs);

    if !browser_exited {
        eprintln!("Closing browser...");
        let _ = browser_instance.close().await;
        // Wait briefly for handler to clean up, but don't block indefinitely
        let _ = tokio::time::timeout(Duration::from_secs(5), handler_handle).await;
    }
    eprintln!("Done.");
    Ok(())
}

/// Synchronous entry point that creates a tokio runtime and runs the session.
pub fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(config))
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;
    Ok(())
}
