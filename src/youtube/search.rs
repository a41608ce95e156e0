use miette::{Context, IntoDiagnostic, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::check_status;
use crate::types::VideoCandidate;

pub const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// One search request: latest videos for a keyword in a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub region_code: String,
    pub max_results: u32,
}

/// Interface for discovering videos
pub trait VideoSearch {
    /// Return at most `query.max_results` videos, most recently uploaded first
    fn search(&self, query: &SearchQuery) -> Result<Vec<VideoCandidate>>;
}

/// `search.list` endpoint, authenticated with an API key
#[derive(Debug, Clone)]
pub struct YoutubeSearch {
    http: Client,
    api_key: String,
}

impl YoutubeSearch {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

impl VideoSearch for YoutubeSearch {
    fn search(&self, query: &SearchQuery) -> Result<Vec<VideoCandidate>> {
        let max_results = query.max_results.to_string();
        let params = [
            ("part", "id,snippet"),
            ("q", query.keyword.as_str()),
            ("maxResults", max_results.as_str()),
            ("order", "date"),
            ("type", "video"),
            ("regionCode", query.region_code.as_str()),
            ("key", self.api_key.as_str()),
        ];

        let resp = self
            .http
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .into_diagnostic()
            .wrap_err("Search request failed")?;

        let page: SearchListResponse = check_status(resp)?
            .json()
            .into_diagnostic()
            .wrap_err("Could not decode search results")?;

        let candidates = page.into_candidates();
        debug!("Search returned {} videos", candidates.len());
        Ok(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: ResourceId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

impl SearchListResponse {
    /// Keep the results that are actual videos
    fn into_candidates(self) -> Vec<VideoCandidate> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id?;
                let title = item.snippet.map(|s| s.title).unwrap_or_else(|| video_id.clone());
                Some(VideoCandidate::from_video_id(&video_id, title))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::SearchListResponse;

    #[test]
    fn maps_items_to_candidates() {
        let json = indoc! {r#"
            {
              "kind": "youtube#searchListResponse",
              "items": [
                {
                  "id": { "kind": "youtube#video", "videoId": "dQw4w9WgXcQ" },
                  "snippet": { "title": "Insane clutch/1v5", "channelTitle": "someone" }
                },
                {
                  "id": { "kind": "youtube#channel", "channelId": "UC123" },
                  "snippet": { "title": "A channel" }
                },
                {
                  "id": { "kind": "youtube#video", "videoId": "abc" }
                }
              ]
            }
        "#};

        let page: SearchListResponse = serde_json::from_str(json).unwrap();
        let candidates = page.into_candidates();

        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].url,
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(candidates[0].title, "Insane clutch/1v5");
        assert_eq!(candidates[0].file_stem(), "Insane clutch_1v5");
        assert_eq!(candidates[1].title, "abc");
    }

    #[test]
    fn empty_page_has_no_candidates() {
        let page: SearchListResponse = serde_json::from_str("{}").unwrap();
        assert!(page.into_candidates().is_empty());
    }
}
