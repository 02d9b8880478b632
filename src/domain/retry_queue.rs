use serde::{Deserialize, Serialize};

use super::page_record::PageRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryQueueItem {
    pub id: String,
    pub page_data: PageRecord,
    pub retry_count: u32,
    pub last_attempt_timestamp: i64,
    pub error: String,
}

impl RetryQueueItem {
    pub fn new(page_data: PageRecord, error: String, now: i64) -> Self {
        RetryQueueItem {
            id: queue_item_id(&page_data),
            page_data,
            retry_count: 0,
            last_attempt_timestamp: now,
            error,
        }
    }

    pub fn record_failure(&mut self, error: String, now: i64) {
        self.retry_count += 1;
        self.last_attempt_timestamp = now;
        self.error = error;
    }
}

/// Same url and capture time means the same navigation, hence the same item.
pub fn queue_item_id(page: &PageRecord) -> String {
    format!("{}_{}", page.url, page.timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionStatus {
    Idle,
    Extracting,
    Sending,
    Success,
    Queued,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionState {
    pub status: TransmissionStatus,
    pub queue_size: usize,
    pub total_queued_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TransmissionState {
    pub fn derive(queue: &[RetryQueueItem], current: TransmissionStatus) -> Self {
        let total_queued_bytes = queue.iter().map(|item| item.page_data.markdown_size()).sum();

        TransmissionState {
            status: match queue.is_empty() {
                true => current,
                false => TransmissionStatus::Queued,
            },
            queue_size: queue.len(),
            total_queued_bytes,
            last_error: queue.last().map(|item| item.error.clone()),
        }
    }
}
