use std::{fmt::Display, path::PathBuf};

use miette::miette;

/// Errors callers need to tell apart.
/// Everything else travels as a [`miette::Report`].
#[derive(Debug)]
pub enum Error {
    /// The download utility reported the stream as unavailable
    Unavailable,

    /// No date directory exists for the requested day
    MissingDirectory(PathBuf),

    /// The date directory does not hold enough videos to fill the day
    NotEnoughVideos { found: usize, needed: usize },

    /// The download loop hit its round limit before filling the directory
    SearchExhausted { rounds: u32, found: usize, needed: usize },

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette!(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Miette(err) => err,
            err => miette!("{err}"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unavailable => write!(f, "Unavailable stream"),
            Error::MissingDirectory(path) => {
                write!(f, "No download folder found: {}", path.display())
            }
            Error::NotEnoughVideos { found, needed } => {
                write!(f, "Not enough videos to post, found {found} out of {needed}")
            }
            Error::SearchExhausted {
                rounds,
                found,
                needed,
            } => write!(
                f,
                "Gave up after {rounds} search rounds with {found} out of {needed} videos"
            ),
            Error::Miette(report) => write!(f, "{report}"),
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
