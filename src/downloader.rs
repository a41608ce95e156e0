use miette::{Context, Result};
use time::Date;
use tracing::info;

use crate::{
    config::Settings,
    download::DownloadSession,
    io::create_date_directory,
    outside::VideoFetcher,
    schedule::{Clock, Scheduler},
    youtube::VideoSearch,
};

/// Create the date directory of `date` and fill it with the day's videos
pub fn daily_download(
    settings: &Settings,
    date: Date,
    search: &dyn VideoSearch,
    fetcher: &dyn VideoFetcher,
    rng: &mut fastrand::Rng,
) -> Result<usize> {
    let dir = create_date_directory(&settings.downloads_dir, date)?;
    info!("Downloading the videos of {date} into {}", dir.display());

    let session = DownloadSession::new(
        date,
        dir,
        settings.daily_target,
        &settings.downloader,
        search,
        fetcher,
    );
    let count = session
        .run(rng)
        .map_err(miette::Report::from)
        .wrap_err_with(|| format!("Download session of {date} did not complete"))?;

    info!("{count} videos ready in {}", session.dir().display());
    Ok(count)
}

/// Register the daily download job
pub fn schedule_daily_download<'a, C: Clock>(
    scheduler: &mut Scheduler<'a, C>,
    settings: &'a Settings,
    search: &'a dyn VideoSearch,
    fetcher: &'a dyn VideoFetcher,
    mut rng: fastrand::Rng,
) {
    scheduler.every_day_at(settings.downloader.at, "daily download", move |now| {
        daily_download(settings, now.date(), search, fetcher, &mut rng).map(|_| ())
    });
}
