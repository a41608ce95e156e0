use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use miette::{bail, miette, Context, IntoDiagnostic, Result};
use reqwest::{
    blocking::Body,
    header::{CONTENT_RANGE, LOCATION, RANGE},
    StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_status, Session};
use crate::types::{PrivacyStatus, VideoMetadata};

pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Interface for publishing a video file
pub trait VideoPublisher {
    /// Publish the file as a new video and return the id the platform gave it
    fn publish(&self, video: &Path, metadata: &VideoMetadata) -> Result<String>;
}

/// `videos.insert` through the resumable upload protocol
#[derive(Debug)]
pub struct YoutubeUploader {
    session: Session,
    chunk_size: Option<u64>,
    upload_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: Status,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    privacy_status: PrivacyStatus,
}

#[derive(Debug, Deserialize)]
struct InsertedVideo {
    id: String,
}

impl<'a> From<&'a VideoMetadata> for VideoResource<'a> {
    fn from(metadata: &'a VideoMetadata) -> Self {
        Self {
            snippet: Snippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: &metadata.category_id,
            },
            status: Status {
                privacy_status: metadata.privacy,
            },
        }
    }
}

/// `Content-Range` value for the bytes `[offset, offset + len)` of a `total` bytes file
fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len - 1, total)
}

/// Offset to resume from, given the `Range` header of a `308` answer
/// (`bytes=0-524287`). No header means nothing was stored.
fn resume_offset(range: Option<&str>) -> Result<u64> {
    let Some(range) = range else {
        return Ok(0);
    };

    let last = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, last)| last.parse::<u64>().ok())
        .ok_or_else(|| miette!("Malformed Range header in upload answer: {range}"))?;
    Ok(last + 1)
}

impl YoutubeUploader {
    pub fn new(session: Session, chunk_size: Option<u64>) -> Self {
        Self {
            session,
            chunk_size,
            upload_url: UPLOAD_URL.to_owned(),
        }
    }

    /// Send the upload requests to another endpoint than [`UPLOAD_URL`]
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    /// Send the metadata and get back the URI the bytes must be sent to
    fn start_session(&self, size: u64, metadata: &VideoMetadata) -> Result<String> {
        let resp = self
            .session
            .http()
            .post(&self.upload_url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(self.session.access_token()?)
            .header("X-Upload-Content-Length", size)
            .header("X-Upload-Content-Type", VIDEO_MIME_TYPE)
            .json(&VideoResource::from(metadata))
            .send()
            .into_diagnostic()
            .wrap_err("Could not start the upload session")?;

        let resp = check_status(resp)?;
        let location = resp
            .headers()
            .get(LOCATION)
            .ok_or_else(|| miette!("Upload session answer has no Location header"))?;
        let location = location.to_str().into_diagnostic()?.to_owned();
        Ok(location)
    }

    /// Send the file, chunk by chunk, until the API answers with the created video
    fn send_file(&self, session_uri: &str, mut file: File, size: u64) -> Result<InsertedVideo> {
        let chunk_size = self.chunk_size.unwrap_or(size).min(size);
        let mut offset = 0;

        loop {
            let len = chunk_size.min(size - offset);
            debug!("Sending bytes {offset}..{} of {size}", offset + len);

            file.seek(SeekFrom::Start(offset)).into_diagnostic()?;
            let chunk = file.try_clone().into_diagnostic()?.take(len);

            let resp = self
                .session
                .http()
                .put(session_uri)
                .bearer_auth(self.session.access_token()?)
                .header(CONTENT_RANGE, content_range(offset, len, size))
                .body(Body::sized(chunk, len))
                .send()
                .into_diagnostic()
                .wrap_err("Upload request failed")?;

            // 308 "Resume Incomplete": the server wants the rest of the file
            if resp.status() == StatusCode::PERMANENT_REDIRECT {
                let range = resp.headers().get(RANGE).and_then(|v| v.to_str().ok());
                let next = resume_offset(range)?;
                if next <= offset && len > 0 {
                    bail!("Upload made no progress at byte {offset}");
                }
                offset = next;
                continue;
            }

            return check_status(resp)?
                .json()
                .into_diagnostic()
                .wrap_err("Could not decode the uploaded video resource");
        }
    }
}

impl VideoPublisher for YoutubeUploader {
    fn publish(&self, video: &Path, metadata: &VideoMetadata) -> Result<String> {
        info!("Uploading video: {}", video.display());

        let file = File::open(video)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not open {}", video.display()))?;
        let size = file.metadata().into_diagnostic()?.len();
        if size == 0 {
            bail!("Refusing to upload the empty file {}", video.display());
        }

        let session_uri = self.start_session(size, metadata)?;
        let inserted = self.send_file(&session_uri, file, size)?;

        info!("Video uploaded successfully: {}", inserted.id);
        Ok(inserted.id)
    }
}
