use std::path::{Path, PathBuf};

use miette::miette;
use time::Date;
use tracing::{error, info, warn};

use crate::{
    config::DownloaderSettings,
    io::{count_videos, has_entry_with_prefix},
    outside::VideoFetcher,
    result::{Error, Result},
    types::VideoCandidate,
    youtube::{SearchQuery, VideoSearch},
};

/// Turn a video title into a file stem by replacing the path separators.
///
/// The result is also the key used to recognize an already downloaded video.
pub fn sanitize_title(title: &str) -> String {
    title.replace(['/', '\\'], "_")
}

/// Output template for the download utility, escaping its `%` placeholders
fn output_template(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.%(ext)s", stem.replace('%', "%%")))
}

/// Whether a file named after this title already exists in the directory
pub fn is_already_downloaded(dir: &Path, title: &str) -> Result<bool> {
    Ok(has_entry_with_prefix(dir, &sanitize_title(title))?)
}

/// What became of one search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Downloaded,
    AlreadyDownloaded,
    Unavailable,
    Failed,
}

/// Fill one date directory with videos
pub struct DownloadSession<'a> {
    date: Date,
    dir: PathBuf,
    target: usize,
    settings: &'a DownloaderSettings,
    search: &'a dyn VideoSearch,
    fetcher: &'a dyn VideoFetcher,
}

impl<'a> DownloadSession<'a> {
    pub fn new(
        date: Date,
        dir: PathBuf,
        target: usize,
        settings: &'a DownloaderSettings,
        search: &'a dyn VideoSearch,
        fetcher: &'a dyn VideoFetcher,
    ) -> Self {
        Self {
            date,
            dir,
            target,
            settings,
            search,
            fetcher,
        }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pick a keyword and a region uniformly at random
    pub fn random_query(&self, rng: &mut fastrand::Rng) -> Result<SearchQuery> {
        let keyword = rng
            .choice(&self.settings.keywords)
            .ok_or_else(|| miette!("No search keyword configured"))?;
        let region_code = rng
            .choice(&self.settings.region_codes)
            .ok_or_else(|| miette!("No region code configured"))?;

        Ok(SearchQuery {
            keyword: keyword.clone(),
            region_code: region_code.clone(),
            max_results: self.settings.max_results,
        })
    }

    /// Download a search result unless a file with its title already exists.
    ///
    /// Download failures are logged and reported through the [`Outcome`],
    /// only filesystem errors are returned.
    pub fn download(&self, candidate: &VideoCandidate) -> Result<Outcome> {
        let stem = candidate.file_stem();
        if has_entry_with_prefix(&self.dir, &stem)? {
            info!("Skipping {}: already downloaded.", candidate.title);
            return Ok(Outcome::AlreadyDownloaded);
        }

        info!("Downloading: {}", candidate.url);
        match self
            .fetcher
            .fetch(&candidate.url, &output_template(&self.dir, &stem))
        {
            Ok(()) => {
                info!("Downloaded video: {}", candidate.title);
                Ok(Outcome::Downloaded)
            }
            Err(Error::Unavailable) => {
                warn!("Video {candidate} is unavailable. Not downloaded");
                Ok(Outcome::Unavailable)
            }
            Err(err) => {
                error!("Failed to download video {}. Error: {err}", candidate.title);
                Ok(Outcome::Failed)
            }
        }
    }

    /// Search and download until the directory holds the target number of videos.
    ///
    /// Without a `max_rounds` setting this does not return while the searches
    /// keep yielding nothing new.
    pub fn run(&self, rng: &mut fastrand::Rng) -> Result<usize> {
        let mut count = count_videos(&self.dir)?;
        let mut rounds = 0;

        while count < self.target {
            if let Some(max_rounds) = self.settings.max_rounds {
                if rounds >= max_rounds {
                    return Err(Error::SearchExhausted {
                        rounds,
                        found: count,
                        needed: self.target,
                    });
                }
            }
            rounds += 1;

            info!("Checking if {} videos are downloaded...", self.target);
            let query = self.random_query(rng)?;
            info!(
                "Searching with query: '{}' in region: {}",
                query.keyword, query.region_code
            );

            let candidates = self.search.search(&query).unwrap_or_else(|report| {
                error!("Search failed: {report}");
                Vec::new()
            });

            let before = count;
            for candidate in &candidates {
                if count >= self.target {
                    break;
                }
                self.download(candidate)?;
                count = count_videos(&self.dir)?;
            }

            info!("Current downloaded videos: {count}");
            if count == before {
                warn!(
                    "Search round {rounds} brought no new video ({} results)",
                    candidates.len()
                );
            }
        }

        Ok(count)
    }
}
