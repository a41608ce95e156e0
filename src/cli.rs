use std::path::PathBuf;

use clap::{Args, Parser};
use tracing::Level;

macro_rules! arg_env {
    ($v:literal) => {
        concat!("SHORTCAST_", $v)
    };
}

/// Options understood by both processes
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The path to the TOML settings file.
    ///
    /// When not given, `shortcast.toml` is read from the working directory if it exists
    /// and the built-in defaults are used otherwise.
    #[arg(long, short, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// The most verbose log level to print
    #[arg(long, default_value_t = Level::INFO, env = arg_env!("LOG_LEVEL"))]
    pub log_level: Level,
}

/// Search for short gaming videos every day at midnight
/// and download a fresh batch into a dated directory.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct DownloaderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Fill today's directory right away and exit instead of waiting for the daily run
    #[arg(long, env = arg_env!("NOW"))]
    pub now: bool,
}

/// Publish today's downloaded videos at fixed times of the day
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct UploaderArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definitions_are_consistent() {
        DownloaderArgs::command().debug_assert();
        UploaderArgs::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = DownloaderArgs::try_parse_from(["shortcast-downloader"]).unwrap();
        assert_eq!(args.common.config, None);
        assert_eq!(args.common.log_level, Level::INFO);
        assert!(!args.now);
    }

    #[test]
    fn parses_overrides() {
        let args = UploaderArgs::try_parse_from([
            "shortcast-uploader",
            "--config",
            "/etc/shortcast.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.common.config, Some(PathBuf::from("/etc/shortcast.toml")));
        assert_eq!(args.common.log_level, Level::DEBUG);
    }
}
