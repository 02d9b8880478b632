use serde::{Deserialize, Serialize};

use super::{
    retry_queue::TransmissionStatus,
    tab_state::{TabId, TabState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationStatus {
    Loading,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardedLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<ForwardedLevel> for log::Level {
    fn from(level: ForwardedLevel) -> Self {
        match level {
            ForwardedLevel::Error => log::Level::Error,
            ForwardedLevel::Warn => log::Level::Warn,
            ForwardedLevel::Info => log::Level::Info,
            ForwardedLevel::Debug => log::Level::Debug,
        }
    }
}

/// Every message the browser side may send, keyed by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    TabUpdated {
        tab_id: TabId,
        url: String,
        status: NavigationStatus,
        #[serde(default)]
        html: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    GetPageContent { url: String, html: String },
    #[serde(rename_all = "camelCase")]
    GetTabData { tab_id: TabId },
    GetTransmissionState,
    SetTransmissionStatus { status: TransmissionStatus },
    ManualRetry,
    #[serde(rename_all = "camelCase")]
    RerunExtraction { tab_id: TabId },
    ForwardBackgroundLog { level: ForwardedLevel, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: ErrorMessage,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorReply {
            error: ErrorMessage {
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDataReply {
    pub tab_id: TabId,
    pub data: Option<TabState>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ErrorReply, ForwardedLevel, NavigationStatus, Request};
    use crate::domain::retry_queue::TransmissionStatus;

    #[test]
    fn tab_updated_reads_camel_case_fields() {
        let request: Request = serde_json::from_value(json!({
            "action": "tabUpdated",
            "tabId": 12,
            "url": "https://example.com",
            "status": "complete"
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::TabUpdated {
                tab_id: 12,
                url: "https://example.com".to_string(),
                status: NavigationStatus::Complete,
                html: None,
            }
        );
    }

    #[test]
    fn unit_and_payload_actions_parse() {
        let retry: Request = serde_json::from_value(json!({"action": "manualRetry"})).unwrap();
        assert_eq!(retry, Request::ManualRetry);

        let status: Request = serde_json::from_value(json!({
            "action": "setTransmissionStatus",
            "status": "sending"
        }))
        .unwrap();
        assert_eq!(
            status,
            Request::SetTransmissionStatus {
                status: TransmissionStatus::Sending
            }
        );

        let log: Request = serde_json::from_value(json!({
            "action": "forwardBackgroundLog",
            "level": "warn",
            "message": "hm"
        }))
        .unwrap();
        assert_eq!(
            log,
            Request::ForwardBackgroundLog {
                level: ForwardedLevel::Warn,
                message: "hm".to_string()
            }
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        let parsed = serde_json::from_value::<Request>(json!({"action": "selfDestruct"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn error_reply_nests_message() {
        assert_eq!(
            serde_json::to_value(ErrorReply::new("nope")).unwrap(),
            json!({"error": {"message": "nope"}})
        );
    }
}
