use serde::{Deserialize, Serialize};

pub type TabId = i64;

pub const NOT_APPLICABLE_MESSAGE: &str = "Content extraction not available for this page type";

/// Lifecycle snapshot of one browser tab.
///
/// Content only exists on `Ready`, an error message only on `Error` and
/// `NotApplicable`; the variants make any other combination unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum TabState {
    Loading,
    Ready {
        content: String,
        #[serde(rename = "contentSize")]
        content_size: usize,
    },
    NotApplicable {
        error: String,
    },
    Error {
        error: String,
    },
}

impl TabState {
    pub fn ready(content: String) -> Self {
        let content_size = content.len();
        TabState::Ready {
            content,
            content_size,
        }
    }

    pub fn not_applicable() -> Self {
        TabState::NotApplicable {
            error: NOT_APPLICABLE_MESSAGE.to_string(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TabState::Loading => "loading",
            TabState::Ready { .. } => "ready",
            TabState::NotApplicable { .. } => "not-applicable",
            TabState::Error { .. } => "error",
        }
    }
}

pub fn is_extractable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{is_extractable_url, TabState};

    #[test]
    fn ready_state_serializes_with_content_size() {
        let state = TabState::ready("héllo".to_string());
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"state": "ready", "content": "héllo", "contentSize": 6})
        );
    }

    #[test]
    fn error_fields_only_on_error_states() {
        let loading = serde_json::to_value(TabState::Loading).unwrap();
        assert_eq!(loading, json!({"state": "loading"}));

        let na: TabState =
            serde_json::from_value(json!({"state": "not-applicable", "error": "nope"})).unwrap();
        assert_eq!(na.tag(), "not-applicable");

        let bogus = serde_json::from_value::<TabState>(json!({"state": "ready"}));
        assert!(bogus.is_err());
    }

    #[test]
    fn only_http_urls_are_extractable() {
        assert!(is_extractable_url("https://example.com"));
        assert!(is_extractable_url("http://example.com/a"));
        assert!(!is_extractable_url("chrome://extensions"));
        assert!(!is_extractable_url("about:blank"));
    }
}
