use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ::config::{Config, Environment, File, FileFormat};
use miette::{bail, Context, IntoDiagnostic, Result};
use serde::Deserialize;

use crate::types::{ClockTime, PrivacyStatus};

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "shortcast.toml";

/// Prefix of the environment variables overriding the config file
pub const ENV_PREFIX: &str = "SHORTCAST";

/// YouTube "Gaming" category
pub const DEFAULT_CATEGORY_ID: &str = "20";

/// Resumable upload chunks must be a multiple of this size
pub const UPLOAD_CHUNK_GRANULARITY: u64 = 256 * 1024;

const DEFAULT_KEYWORDS: [&str; 15] = [
    "gaming shorts",
    "epic gameplay",
    "best gaming highlights",
    "daily game clips",
    "pro gamer tips",
    "glitch tricks",
    "gaming tutorials",
    "top gaming moments",
    "gaming strategies",
    "funny gaming fails",
    "fastest game wins",
    "trending game glitches",
    "mobile gaming clips",
    "console gameplay",
    "multiplayer game highlights",
];

const DEFAULT_REGION_CODES: [&str; 10] = [
    "US", "GB", "DE", "FR", "IT", "ES", "NL", "SE", "PL", "BE",
];

const DEFAULT_SLOTS: [(u8, u8); 5] = [(3, 0), (9, 0), (13, 0), (16, 0), (23, 0)];

const DEFAULT_TITLES: [&str; 5] = [
    "Epic Gameplay",
    "Gaming Highlights",
    "Best Game Clips",
    "Daily Game",
    "Gaming Tutorial",
];

const DEFAULT_DESCRIPTIONS: [&str; 5] = [
    "Epic moments in gaming.",
    "The best gaming highlights.",
    "Enjoy the best gameplay moments.",
    "Daily game highlights.",
    "Pro gamer tips and tricks.",
];

/// Prefer an mp4 result so the file lands as `<title>.mp4`
const DEFAULT_FORMAT: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b";

/// Settings shared by both processes.
///
/// Every field has a default so that an absent config file still yields
/// a runnable pipeline (apart from the search API key).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the `<YYYY-MM-DD>` date directories
    pub downloads_dir: PathBuf,

    /// How many videos a date directory must hold to be published
    pub daily_target: usize,

    /// Delay between two checks of the job table
    pub poll_interval_secs: u64,

    pub downloader: DownloaderSettings,
    pub uploader: UploaderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloaderSettings {
    /// Daily trigger time
    pub at: ClockTime,

    /// YouTube Data API key used for searching
    pub api_key: String,

    pub keywords: Vec<String>,
    pub region_codes: Vec<String>,

    /// Results requested per search round
    pub max_results: u32,

    /// Give up after this many search rounds. Unbounded if unset.
    pub max_rounds: Option<u32>,

    /// Format selector handed to the download utility
    pub format: String,
}

/// Where the title and description of each published video come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// Pair each slot with the title and description at the same index
    Fixed,
    /// Use the file stem as both title and description
    Filename,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploaderSettings {
    /// Publication times, one video each
    pub slots: Vec<ClockTime>,

    pub metadata: MetadataMode,
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,

    /// Randomize which selected video goes to which slot
    pub shuffle: bool,

    /// OAuth application credentials, as downloaded from the Google console
    pub client_secret_path: PathBuf,

    /// Where the OAuth tokens are kept between runs
    pub token_path: PathBuf,

    /// Size of each upload request. The whole file is sent at once if unset.
    pub chunk_size: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("./downloads"),
            daily_target: 5,
            poll_interval_secs: 1,
            downloader: DownloaderSettings::default(),
            uploader: UploaderSettings::default(),
        }
    }
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            at: ClockTime::from(time::Time::MIDNIGHT),
            api_key: String::new(),
            keywords: to_strings(&DEFAULT_KEYWORDS),
            region_codes: to_strings(&DEFAULT_REGION_CODES),
            max_results: 5,
            max_rounds: None,
            format: DEFAULT_FORMAT.to_owned(),
        }
    }
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS
                .iter()
                .filter_map(|&(h, m)| ClockTime::new(h, m))
                .collect(),
            metadata: MetadataMode::Fixed,
            titles: to_strings(&DEFAULT_TITLES),
            descriptions: to_strings(&DEFAULT_DESCRIPTIONS),
            tags: Vec::new(),
            category_id: DEFAULT_CATEGORY_ID.to_owned(),
            privacy_status: PrivacyStatus::Public,
            shuffle: false,
            client_secret_path: PathBuf::from("./client-secret.json"),
            token_path: PathBuf::from("token.json"),
            chunk_size: None,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Build the settings from the defaults, the TOML file and the environment,
    /// in increasing order of priority.
    ///
    /// An explicitly given file must exist, the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("downloader.keywords")
            .with_list_parse_key("downloader.region_codes")
            .with_list_parse_key("uploader.slots")
            .with_list_parse_key("uploader.tags");

        let settings: Settings = Config::builder()
            .add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(env)
            .build()
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not read configuration from {}", path.display()))?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the constraints between fields
    pub fn validate(&self) -> Result<()> {
        if self.daily_target == 0 {
            bail!("daily_target must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }

        let dl = &self.downloader;
        if dl.keywords.is_empty() {
            bail!("downloader.keywords must not be empty");
        }
        if dl.region_codes.is_empty() {
            bail!("downloader.region_codes must not be empty");
        }
        if !(1..=50).contains(&dl.max_results) {
            bail!(
                "downloader.max_results must be between 1 and 50, got {}",
                dl.max_results
            );
        }

        let up = &self.uploader;
        if up.slots.len() != self.daily_target {
            bail!(
                "uploader.slots holds {} times but daily_target is {}",
                up.slots.len(),
                self.daily_target
            );
        }
        if up.metadata == MetadataMode::Fixed
            && (up.titles.len() < up.slots.len() || up.descriptions.len() < up.slots.len())
        {
            bail!(
                "uploader.titles and uploader.descriptions need one entry per slot ({} slots)",
                up.slots.len()
            );
        }
        if let Some(chunk) = up.chunk_size {
            if chunk == 0 || chunk % UPLOAD_CHUNK_GRANULARITY != 0 {
                bail!(
                    "uploader.chunk_size must be a non-zero multiple of {UPLOAD_CHUNK_GRANULARITY}"
                );
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults_describe_the_daily_gaming_pipeline() {
        let settings = Settings::default();
        settings.validate().unwrap();

        assert_eq!(settings.daily_target, 5);
        assert_eq!(settings.downloads_dir, PathBuf::from("./downloads"));
        assert_eq!(settings.downloader.at.to_string(), "00:00");
        assert_eq!(settings.downloader.keywords.len(), 15);
        assert_eq!(settings.downloader.region_codes.len(), 10);
        assert_eq!(settings.downloader.max_results, 5);
        assert!(settings.downloader.max_rounds.is_none());

        let slots: Vec<String> = settings
            .uploader
            .slots
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(slots, ["03:00", "09:00", "13:00", "16:00", "23:00"]);
        assert_eq!(settings.uploader.category_id, "20");
        assert_eq!(settings.uploader.privacy_status, PrivacyStatus::Public);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            indoc! {r#"
                downloads_dir = "/srv/shorts"

                [downloader]
                keywords = ["speedruns"]
                max_rounds = 20

                [uploader]
                metadata = "filename"
                shuffle = true
                slots = ["01:00", "02:00", "03:00", "04:00", "05:30"]
            "#}
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.downloads_dir, PathBuf::from("/srv/shorts"));
        assert_eq!(settings.downloader.keywords, ["speedruns"]);
        assert_eq!(settings.downloader.max_rounds, Some(20));
        assert_eq!(settings.downloader.region_codes.len(), 10);
        assert_eq!(settings.uploader.metadata, MetadataMode::Filename);
        assert!(settings.uploader.shuffle);
        assert_eq!(settings.uploader.slots[4].to_string(), "05:30");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn slots_must_match_daily_target() {
        let mut settings = Settings::default();
        settings.uploader.slots.pop();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn fixed_metadata_needs_a_title_per_slot() {
        let mut settings = Settings::default();
        settings.uploader.titles.truncate(3);
        assert!(settings.validate().is_err());

        settings.uploader.metadata = MetadataMode::Filename;
        settings.validate().unwrap();
    }

    #[test]
    fn chunk_size_must_be_aligned() {
        let mut settings = Settings::default();
        settings.uploader.chunk_size = Some(1000);
        assert!(settings.validate().is_err());

        settings.uploader.chunk_size = Some(4 * UPLOAD_CHUNK_GRANULARITY);
        settings.validate().unwrap();
    }
}
