use std::path::{Path, PathBuf};

use miette::miette;
use tracing::debug;

use crate::{
    config::{MetadataMode, UploaderSettings},
    io::list_videos,
    result::{Error, Result},
    types::{ClockTime, VideoMetadata},
};

/// YouTube rejects longer titles
const MAX_TITLE_CHARS: usize = 100;

/// The videos of one day, fixed once selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    videos: Vec<PathBuf>,
}

/// One video bound to its publication slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledUpload {
    pub slot: ClockTime,
    pub video: PathBuf,
    pub metadata: VideoMetadata,
}

impl UploadBatch {
    /// Pick `count` videos out of a date directory.
    ///
    /// When more are available they are sampled uniformly without replacement.
    /// The batch is kept in file name order.
    pub fn select(dir: &Path, count: usize, rng: &mut fastrand::Rng) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::MissingDirectory(dir.to_path_buf()));
        }

        let mut videos = list_videos(dir)?;
        if videos.len() < count {
            return Err(Error::NotEnoughVideos {
                found: videos.len(),
                needed: count,
            });
        }

        if videos.len() > count {
            debug!("Sampling {count} videos out of {}", videos.len());
            rng.shuffle(&mut videos);
            videos.truncate(count);
            videos.sort();
        }

        Ok(Self { videos })
    }

    pub fn videos(&self) -> &[PathBuf] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Bind every video to one slot, in order, or in random order when
    /// `settings.shuffle` is set.
    pub fn plan(
        &self,
        settings: &UploaderSettings,
        rng: &mut fastrand::Rng,
    ) -> Result<Vec<ScheduledUpload>> {
        if settings.slots.len() != self.videos.len() {
            return Err(miette!(
                "{} videos cannot fill {} slots",
                self.videos.len(),
                settings.slots.len()
            )
            .into());
        }

        let mut videos = self.videos.clone();
        if settings.shuffle {
            rng.shuffle(&mut videos);
        }

        settings
            .slots
            .iter()
            .zip(videos)
            .enumerate()
            .map(|(index, (&slot, video))| -> Result<ScheduledUpload> {
                let metadata = metadata_for(settings, index, &video)?;
                Ok(ScheduledUpload {
                    slot,
                    video,
                    metadata,
                })
            })
            .collect()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Metadata of the video published in the `index`-th slot
pub fn metadata_for(
    settings: &UploaderSettings,
    index: usize,
    video: &Path,
) -> miette::Result<VideoMetadata> {
    let (title, description) = match settings.metadata {
        MetadataMode::Fixed => {
            let title = settings
                .titles
                .get(index)
                .ok_or_else(|| miette!("No title configured for slot {index}"))?;
            let description = settings
                .descriptions
                .get(index)
                .ok_or_else(|| miette!("No description configured for slot {index}"))?;
            (title.clone(), description.clone())
        }
        MetadataMode::Filename => {
            let stem = video
                .file_stem()
                .ok_or_else(|| miette!("{} has no file name", video.display()))?
                .to_string_lossy();
            (truncate_chars(&stem, MAX_TITLE_CHARS), stem.into_owned())
        }
    };

    Ok(VideoMetadata::new(title, description)
        .with_tags(settings.tags.clone())
        .with_category(settings.category_id.clone())
        .with_privacy(settings.privacy_status))
}
