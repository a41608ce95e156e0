use clap::Parser;
use miette::{bail, Result};
use shortcast::{
    cli::DownloaderArgs,
    config::Settings,
    downloader::{daily_download, schedule_daily_download},
    logging::{init_logging, local_offset},
    outside::Ytdl,
    schedule::{Clock, LocalClock, Scheduler},
    youtube::{http_client, YoutubeSearch},
};
use tracing::info;

fn main() -> Result<()> {
    // Queried while the process is still single-threaded
    let offset = local_offset()?;
    let args = DownloaderArgs::parse();
    init_logging(args.common.log_level, offset)?;

    let settings = Settings::load(args.common.config.as_deref())?;
    if settings.downloader.api_key.trim().is_empty() {
        bail!(
            "No search API key configured, \
             set downloader.api_key or SHORTCAST_DOWNLOADER__API_KEY"
        );
    }

    let search = YoutubeSearch::new(http_client()?, settings.downloader.api_key.clone());
    let fetcher = Ytdl::new(settings.downloader.format.clone())?;
    info!("Downloading with {}", fetcher.program());

    let clock = LocalClock::new(offset);
    let mut rng = fastrand::Rng::new();

    if args.now {
        daily_download(&settings, clock.now().date(), &search, &fetcher, &mut rng)?;
        return Ok(());
    }

    let mut scheduler = Scheduler::new(clock);
    schedule_daily_download(&mut scheduler, &settings, &search, &fetcher, rng);
    info!("Scheduled daily downloads at {}", settings.downloader.at);

    scheduler.run_forever(settings.poll_interval())
}
