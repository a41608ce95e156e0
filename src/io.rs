use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use miette::{Context, IntoDiagnostic, Result};
use time::{format_description::FormatItem, macros::format_description, Date};

/// Extension of the files the pipeline produces and publishes
pub const VIDEO_EXTENSION: &str = "mp4";

const DATE_DIRECTORY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Path of the directory holding the videos of the given day:
/// `<root>/<YYYY-MM-DD>`
pub fn date_directory(root: &Path, date: Date) -> PathBuf {
    // The format only has numeric components, it cannot fail
    let name = date
        .format(DATE_DIRECTORY_FORMAT)
        .unwrap_or_else(|_| date.to_string());
    root.join(name)
}

/// Create the date directory and its parents if needed, and return its path
pub fn create_date_directory(root: &Path, date: Date) -> Result<PathBuf> {
    let dir = date_directory(root, date);
    fs::create_dir_all(&dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not create directory {}", dir.display()))?;
    Ok(dir)
}

fn is_video(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == VIDEO_EXTENSION)
}

/// List the `.mp4` files of a directory, sorted by file name
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in dir
        .read_dir()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not read directory {}", dir.display()))?
    {
        let path = entry.into_diagnostic()?.path();
        if is_video(&path) {
            videos.push(path);
        }
    }

    videos.sort();
    Ok(videos)
}

/// Count the `.mp4` files of a directory
pub fn count_videos(dir: &Path) -> Result<usize> {
    Ok(list_videos(dir)?.len())
}

/// Check whether any entry of the directory has a name starting with `prefix`.
///
/// The comparison is case-sensitive and ignores extensions, so partially
/// downloaded files also match.
pub fn has_entry_with_prefix(dir: &Path, prefix: &str) -> Result<bool> {
    for entry in dir
        .read_dir()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not read directory {}", dir.display()))?
    {
        let name = entry.into_diagnostic()?.file_name();
        if name.to_string_lossy().starts_with(prefix) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Replace the content of a file without ever leaving it half-written.
///
/// The data goes to a temporary file in the same directory which is
/// then renamed over the destination.
pub fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .into_diagnostic()
        .wrap_err("Could not create temporary file")?;
    tmp.write_all(data).into_diagnostic()?;
    tmp.persist(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not write {}", path.display()))?;
    Ok(())
}
