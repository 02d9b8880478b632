use serde::{Deserialize, Serialize};

/// One extracted page, as shipped to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub title: String,
    pub url: String,
    pub author: String,
    pub published: String,
    pub content: String,
    pub markdown: String,
    pub description: String,
    pub domain: String,
    pub favicon: String,
    pub image: String,
    pub site: String,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl PageRecord {
    pub fn markdown_size(&self) -> usize {
        self.markdown.len()
    }
}
