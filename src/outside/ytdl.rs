use std::{ffi::OsStr, path::Path};

use miette::miette;
use tracing::debug;

use super::command::{is_installed, run_command, YT_DL, YT_DLP};
use crate::result::{Error, Result};

/// Interface for fetching a video file from its page URL
pub trait VideoFetcher {
    /// Download the video at `url`.
    ///
    /// `output_template` is the destination path where `%(ext)s` stands for
    /// the extension chosen by the implementation and `%%` for a literal `%`.
    ///
    /// Returns [`Error::Unavailable`] when the video cannot be fetched
    /// at all (removed, private, region locked...).
    fn fetch(&self, url: &str, output_template: &Path) -> Result<()>;
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program,
/// or [youtube-dl](https://github.com/ytdl-org/youtube-dl) when it is the only one installed
#[derive(Debug)]
pub struct Ytdl {
    program: &'static str,
    format: String,
}

impl Ytdl {
    /// Use `yt-dlp` when installed, `youtube-dl` otherwise
    pub fn new(format: impl Into<String>) -> Result<Self> {
        let program = if is_installed(YT_DLP) {
            YT_DLP
        } else if is_installed(YT_DL) {
            YT_DL
        } else {
            return Err(miette!("Neither yt-dlp nor youtube-dl found").into());
        };

        Ok(Self {
            program,
            format: format.into(),
        })
    }

    pub fn program(&self) -> &'static str {
        self.program
    }
}

/// Arguments downloading the single video at `url` into `output_template`,
/// remuxed or merged into an mp4 container.
fn fetch_args<'a>(
    program: &str,
    format: &'a str,
    output_template: &'a Path,
    url: &'a str,
) -> Vec<&'a OsStr> {
    let container: [&'static str; 2] = if program == YT_DLP {
        ["--remux-video", "mp4"]
    } else {
        ["--merge-output-format", "mp4"]
    };

    let mut args: Vec<&OsStr> = ["-q", "--no-playlist", "-o"].map(OsStr::new).to_vec();
    args.push(output_template.as_os_str());
    args.extend(["-f", format].map(OsStr::new));
    args.extend(container.map(OsStr::new));
    args.extend(["--", url].map(OsStr::new));
    args
}

fn is_unavailable(stderr: &str) -> bool {
    stderr
        .lines()
        .any(|line| line.starts_with("ERROR:") && line.to_lowercase().contains("unavailable"))
}

impl VideoFetcher for Ytdl {
    fn fetch(&self, url: &str, output_template: &Path) -> Result<()> {
        debug!("Fetching {url} with {}", self.program);

        let args = fetch_args(self.program, &self.format, output_template, url);
        let res = run_command(self.program, |cmd| cmd.args(args))?;

        let stderr = String::from_utf8_lossy(&res.stderr);
        if is_unavailable(&stderr) {
            return Err(Error::Unavailable);
        }
        if res.status.success() {
            return Ok(());
        }

        let last_error = stderr
            .lines()
            .rev()
            .find(|line| line.starts_with("ERROR:"))
            .unwrap_or("no error message");
        Err(miette!(
            "{} did run but was not successful ({}): {last_error}",
            self.program,
            res.status
        )
        .into())
    }
}
