use serde::{Deserialize, Serialize};

/// Visibility of a published video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// Everything the platform needs to know about a video besides its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: PrivacyStatus,
}

impl VideoMetadata {
    /// Public video in the default category, without tags
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
            category_id: crate::config::DEFAULT_CATEGORY_ID.to_owned(),
            privacy: PrivacyStatus::Public,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    pub fn with_privacy(mut self, privacy: PrivacyStatus) -> Self {
        self.privacy = privacy;
        self
    }
}
