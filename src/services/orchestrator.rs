use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::domain::{
    page_record::PageRecord,
    retry_queue::TransmissionStatus,
    tab_state::{is_extractable_url, TabId, TabState},
};

use super::{
    storage::{load_as, save_as, Storage, TAB_STATES_KEY},
    DeliveryQueue, DocumentSource, PageExtractor,
};

const NOTIFICATION_CAPACITY: usize = 64;

/// Pushed to listeners whenever a tab settles into a new state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TabNotification {
    #[serde(rename_all = "camelCase")]
    TabDataReady { tab_id: TabId, data: TabState },
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no navigation recorded for tab {0}")]
    UnknownTab(TabId),
}

struct TabEntry {
    url: Option<String>,
    /// Stamp of the navigation this state belongs to.
    navigation: u64,
    state: TabState,
}

/// Per-tab extraction state machine.
pub struct Orchestrator {
    tabs: Mutex<HashMap<TabId, TabEntry>>,
    navigation_counter: AtomicU64,
    storage: Arc<dyn Storage>,
    extractor: PageExtractor,
    documents: Arc<dyn DocumentSource>,
    delivery: Arc<DeliveryQueue>,
    notifier: broadcast::Sender<TabNotification>,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: PageExtractor,
        documents: Arc<dyn DocumentSource>,
        delivery: Arc<DeliveryQueue>,
    ) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Orchestrator {
            tabs: Mutex::new(HashMap::new()),
            navigation_counter: AtomicU64::new(0),
            storage,
            extractor,
            documents,
            delivery,
            notifier,
        }
    }

    /// Restores tab states saved by a previous run, skipping malformed entries.
    pub async fn load_persisted(&self) {
        let stored =
            match load_as::<HashMap<String, serde_json::Value>>(self.storage.as_ref(), TAB_STATES_KEY)
                .await
            {
                Ok(stored) => stored.unwrap_or_default(),
                Err(e) => {
                    log::error!("Failed to load persisted tab states: {}", e);
                    return;
                }
            };

        let mut tabs = self.tabs.lock().await;
        for (tab_id, value) in stored {
            let (Ok(tab_id), Ok(state)) = (
                tab_id.parse::<TabId>(),
                serde_json::from_value::<TabState>(value),
            ) else {
                log::error!("Skipping malformed persisted state for tab {}", tab_id);
                continue;
            };

            tabs.insert(
                tab_id,
                TabEntry {
                    url: None,
                    navigation: 0,
                    state,
                },
            );
        }

        log::info!("Loaded {} tab states from storage", tabs.len());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TabNotification> {
        self.notifier.subscribe()
    }

    pub async fn tab_data(&self, tab_id: TabId) -> Option<TabState> {
        self.tabs
            .lock()
            .await
            .get(&tab_id)
            .map(|entry| entry.state.clone())
    }

    pub async fn current_url(&self, tab_id: TabId) -> Option<String> {
        self.tabs
            .lock()
            .await
            .get(&tab_id)
            .and_then(|entry| entry.url.clone())
    }

    /// A new navigation supersedes whatever the tab was doing before.
    pub async fn navigation_started(&self, tab_id: TabId, url: &str) -> u64 {
        let navigation = self.navigation_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let state = match is_extractable_url(url) {
            true => TabState::Loading,
            false => TabState::not_applicable(),
        };

        let mut tabs = self.tabs.lock().await;
        tabs.insert(
            tab_id,
            TabEntry {
                url: Some(url.to_string()),
                navigation,
                state: state.clone(),
            },
        );
        self.save_tabs(&tabs).await;
        drop(tabs);

        if let TabState::NotApplicable { .. } = state {
            self.notify(tab_id, state);
        }

        navigation
    }

    /// The page finished loading: extract it, or mark it not applicable.
    pub async fn navigation_completed(&self, tab_id: TabId, url: &str, html: Option<String>) {
        let navigation = {
            let tabs = self.tabs.lock().await;
            match tabs.get(&tab_id) {
                Some(entry) if entry.url.as_deref() == Some(url) && entry.navigation > 0 => {
                    Some(entry.navigation)
                }
                _ => None,
            }
        };
        let Some(navigation) = navigation else {
            // Not-applicable pages are already announced by the new navigation.
            let navigation = self.navigation_started(tab_id, url).await;
            if is_extractable_url(url) {
                self.run_extraction(tab_id, navigation, url, html).await;
            }
            return;
        };

        if !is_extractable_url(url) {
            let state = TabState::not_applicable();
            if self.settle(tab_id, navigation, state.clone()).await {
                self.notify(tab_id, state);
            }
            return;
        }

        self.run_extraction(tab_id, navigation, url, html).await;
    }

    /// Repeats extraction for the tab's current page outside of navigation events.
    pub async fn rerun_extraction(&self, tab_id: TabId) -> Result<(), OrchestratorError> {
        let url = self
            .current_url(tab_id)
            .await
            .ok_or(OrchestratorError::UnknownTab(tab_id))?;

        let navigation = self.navigation_started(tab_id, &url).await;
        if is_extractable_url(&url) {
            self.run_extraction(tab_id, navigation, &url, None).await;
        }

        Ok(())
    }

    pub async fn tab_removed(&self, tab_id: TabId) {
        let mut tabs = self.tabs.lock().await;
        if tabs.remove(&tab_id).is_some() {
            self.save_tabs(&tabs).await;
        }
    }

    /// Extracts a page without touching any tab state.
    pub async fn extract_page(&self, url: &str, html: &str) -> anyhow::Result<PageRecord> {
        self.extractor.extract(url, html).await
    }

    async fn run_extraction(&self, tab_id: TabId, navigation: u64, url: &str, html: Option<String>) {
        let previous = self
            .delivery
            .replace_status(TransmissionStatus::Extracting)
            .await;

        match self.extract(url, html).await {
            Ok(record) => {
                let state = TabState::ready(record.markdown.clone());
                if !self.settle(tab_id, navigation, state.clone()).await {
                    self.delivery.restore_status(previous).await;
                    return;
                }
                log::info!(
                    "Extracted {} ({} bytes of markdown) for tab {}",
                    url,
                    record.markdown_size(),
                    tab_id
                );
                self.notify(tab_id, state);
                self.delivery.send_page_data(record).await;
            }
            Err(e) => {
                log::error!("Extraction failed for tab {} ({}): {:#}", tab_id, url, e);
                self.delivery.restore_status(previous).await;
                let state = TabState::Error {
                    error: e.to_string(),
                };
                if self.settle(tab_id, navigation, state.clone()).await {
                    self.notify(tab_id, state);
                }
            }
        }
    }

    async fn extract(&self, url: &str, html: Option<String>) -> anyhow::Result<PageRecord> {
        let html = match html {
            Some(html) => html,
            None => self.documents.fetch_document(url).await?,
        };
        self.extractor.extract(url, &html).await
    }

    /// Stores the outcome unless a newer navigation took over the tab.
    async fn settle(&self, tab_id: TabId, navigation: u64, state: TabState) -> bool {
        let mut tabs = self.tabs.lock().await;
        match tabs.get_mut(&tab_id) {
            Some(entry) if entry.navigation == navigation => {
                entry.state = state;
            }
            _ => {
                log::debug!(
                    "Discarding stale result for tab {} (navigation {})",
                    tab_id,
                    navigation
                );
                return false;
            }
        }
        self.save_tabs(&tabs).await;
        true
    }

    fn notify(&self, tab_id: TabId, data: TabState) {
        // No receivers is fine: nobody has the UI open.
        _ = self
            .notifier
            .send(TabNotification::TabDataReady { tab_id, data });
    }

    async fn save_tabs(&self, tabs: &HashMap<TabId, TabEntry>) {
        let states: HashMap<String, &TabState> = tabs
            .iter()
            .map(|(tab_id, entry)| (tab_id.to_string(), &entry.state))
            .collect();

        if let Err(e) = save_as(self.storage.as_ref(), TAB_STATES_KEY, &states).await {
            log::error!("Failed to save tab states: {}", e);
        }
    }
}
