use std::{sync::Arc, time::Duration};

use itertools::Itertools;
use reqwest::Client;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};

use crate::domain::{
    page_record::PageRecord,
    retry_queue::{RetryQueueItem, TransmissionState, TransmissionStatus},
};

use super::storage::{load_as, save_as, Storage, RETRY_QUEUE_KEY};

/// Retry counts at which a stuck item gets a warning; there is no cap.
const POISON_WARNING_EVERY: u32 = 10;
const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(1);

struct QueueState {
    items: Vec<RetryQueueItem>,
    status: TransmissionStatus,
}

/// Owns outbound delivery of page records and the persisted retry queue.
///
/// Failed deliveries are retried on every wake-up until they succeed. Nothing
/// is evicted, so a payload the server always rejects stays queued forever.
pub struct DeliveryQueue {
    client: Client,
    endpoint: Option<String>,
    retry_interval: Duration,
    storage: Arc<dyn Storage>,
    state: Mutex<QueueState>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl DeliveryQueue {
    pub fn new(
        endpoint: Option<String>,
        retry_interval: Duration,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let retry_interval = match retry_interval.is_zero() {
            true => {
                log::warn!("Retry interval of zero is not allowed, using {:?}", MIN_RETRY_INTERVAL);
                MIN_RETRY_INTERVAL
            }
            false => retry_interval,
        };

        DeliveryQueue {
            client: Client::new(),
            endpoint: endpoint.filter(|url| !url.trim().is_empty()),
            retry_interval,
            storage,
            state: Mutex::new(QueueState {
                items: vec![],
                status: TransmissionStatus::Idle,
            }),
            retry_task: Mutex::new(None),
        }
    }

    /// Restores the persisted queue and (re)arms the periodic retry.
    pub async fn initialize(self: &Arc<Self>) {
        let items = self.load_queue().await;
        let queue_size = items.len();
        {
            let mut state = self.state.lock().await;
            state.status = match items.is_empty() {
                true => TransmissionStatus::Idle,
                false => TransmissionStatus::Queued,
            };
            state.items = items;
        }

        self.start_retry_timer().await;

        log::info!("Transmission initialized with {} queued items", queue_size);
    }

    async fn start_retry_timer(self: &Arc<Self>) {
        let mut retry_task = self.retry_task.lock().await;
        if let Some(previous) = retry_task.take() {
            previous.abort();
        }

        let queue = Arc::downgrade(self);
        let period = self.retry_interval;
        *retry_task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(queue) = queue.upgrade() else {
                    break;
                };
                if queue.queue_len().await > 0 {
                    queue.process_retry_queue().await;
                }
            }
        }));
    }

    /// One delivery attempt; a failure lands the record in the retry queue.
    pub async fn send_page_data(&self, record: PageRecord) -> bool {
        let Some(endpoint) = self.endpoint.as_deref() else {
            log::info!("No delivery endpoint configured, skipping {}", record.url);
            self.set_status(TransmissionStatus::Success).await;
            return true;
        };

        self.set_status(TransmissionStatus::Sending).await;

        match self.post(endpoint, &record).await {
            Ok(()) => {
                self.set_status(TransmissionStatus::Success).await;
                log::info!("Delivered page data for {}", record.url);
                true
            }
            Err(error) => {
                log::error!("Delivery failed for {}: {}", record.url, error);
                self.add_to_retry_queue(record, error).await;
                self.set_status(TransmissionStatus::Failed).await;
                false
            }
        }
    }

    /// Queues a failed record. A record already queued under the same id is
    /// refreshed in place and keeps its retry count.
    pub async fn add_to_retry_queue(&self, record: PageRecord, error: String) {
        let url = record.url.clone();
        let item = RetryQueueItem::new(record, error, now_millis());
        let mut state = self.state.lock().await;
        match state.items.iter_mut().find(|queued| queued.id == item.id) {
            Some(queued) => {
                queued.page_data = item.page_data;
                queued.error = item.error;
                queued.last_attempt_timestamp = item.last_attempt_timestamp;
            }
            None => state.items.push(item),
        }
        state.status = TransmissionStatus::Queued;
        self.save_queue(&state.items).await;

        log::info!(
            "Queued {} for retry, {} items waiting",
            url,
            state.items.len()
        );
    }

    /// Attempts every queued item once.
    ///
    /// Outcomes are applied to the live queue by id, so items queued while the
    /// pass was in flight survive, and a concurrent pass can at worst repeat a
    /// delivery.
    pub async fn process_retry_queue(&self) {
        let snapshot = self.state.lock().await.items.clone();
        if snapshot.is_empty() {
            return;
        }

        log::info!("Processing retry queue with {} items", snapshot.len());

        let mut outcomes = Vec::with_capacity(snapshot.len());
        for item in snapshot.iter() {
            let outcome = match self.endpoint.as_deref() {
                Some(endpoint) => self.post(endpoint, &item.page_data).await,
                None => Ok(()),
            };
            outcomes.push((item.id.clone(), outcome));
        }

        let mut state = self.state.lock().await;
        let mut delivered = 0;
        let now = now_millis();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    delivered += 1;
                    state.items.retain(|item| item.id != id);
                }
                Err(error) => {
                    if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
                        item.record_failure(error, now);
                        if item.retry_count % POISON_WARNING_EVERY == 0 {
                            log::warn!(
                                "{} has failed {} retries and is still queued: {}",
                                item.page_data.url,
                                item.retry_count,
                                item.error
                            );
                        }
                    }
                }
            }
        }

        self.save_queue(&state.items).await;
        state.status = match state.items.is_empty() {
            true => TransmissionStatus::Idle,
            false => TransmissionStatus::Queued,
        };

        if delivered > 0 {
            log::info!(
                "Retry queue processed: {} delivered, {} remaining",
                delivered,
                state.items.len()
            );
        }
    }

    pub async fn manual_retry_queue(&self) {
        log::info!("Manual retry triggered");
        self.process_retry_queue().await;
    }

    pub async fn transmission_state(&self) -> TransmissionState {
        let state = self.state.lock().await;
        TransmissionState::derive(&state.items, state.status)
    }

    pub async fn set_status(&self, status: TransmissionStatus) {
        let mut state = self.state.lock().await;
        if state.status != status {
            log::debug!("Transmission status {:?} -> {:?}", state.status, status);
        }
        state.status = status;
    }

    /// Sets the status and hands back the one it replaced.
    pub async fn replace_status(&self, status: TransmissionStatus) -> TransmissionStatus {
        let mut state = self.state.lock().await;
        std::mem::replace(&mut state.status, status)
    }

    /// Undoes `Extracting` once extraction ended without a delivery attempt.
    /// A status moved on by someone else in the meantime is left alone.
    pub async fn restore_status(&self, previous: TransmissionStatus) {
        let mut state = self.state.lock().await;
        if state.status == TransmissionStatus::Extracting {
            state.status = match previous {
                TransmissionStatus::Extracting => TransmissionStatus::Idle,
                other => other,
            };
        }
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    async fn post(&self, endpoint: &str, record: &PageRecord) -> Result<(), String> {
        let response = self
            .client
            .post(endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        match status.is_success() {
            true => Ok(()),
            false => Err(format!(
                "Server responded with {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )),
        }
    }

    async fn load_queue(&self) -> Vec<RetryQueueItem> {
        let stored = match load_as::<Vec<serde_json::Value>>(self.storage.as_ref(), RETRY_QUEUE_KEY)
            .await
        {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                log::error!("Failed to load retry queue: {}", e);
                return vec![];
            }
        };

        stored
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<RetryQueueItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::error!("Dropping malformed retry queue entry: {}", e);
                    None
                }
            })
            .unique_by(|item| item.id.clone())
            .collect()
    }

    async fn save_queue(&self, items: &[RetryQueueItem]) {
        if let Err(e) = save_as(self.storage.as_ref(), RETRY_QUEUE_KEY, &items).await {
            log::error!("Failed to save retry queue: {}", e);
        }
    }
}
