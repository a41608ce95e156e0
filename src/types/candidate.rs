use std::fmt::Display;

use crate::download::sanitize_title;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// A search result that may be downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    pub url: String,
    pub title: String,
}

impl VideoCandidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    pub fn from_video_id(video_id: &str, title: impl Into<String>) -> Self {
        Self::new(format!("{WATCH_URL}{video_id}"), title)
    }

    /// File name of the video once downloaded, without extension.
    /// Also the key used to tell whether it was already downloaded.
    pub fn file_stem(&self) -> String {
        sanitize_title(&self.title)
    }
}

impl Display for VideoCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.title, self.url)
    }
}
