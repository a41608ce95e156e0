use clap::Parser;
use miette::Result;
use shortcast::{
    cli::UploaderArgs,
    config::Settings,
    logging::{init_logging, local_offset},
    result::Error,
    schedule::{Clock, LocalClock, Scheduler},
    uploader::{prepare_batch, schedule_uploads},
    youtube::{http_client, Session, YoutubeUploader},
};
use tracing::{info, warn};

fn main() -> Result<()> {
    let offset = local_offset()?;
    let args = UploaderArgs::parse();
    init_logging(args.common.log_level, offset)?;

    let settings = Settings::load(args.common.config.as_deref())?;
    let clock = LocalClock::new(offset);
    let today = clock.now().date();
    let mut rng = fastrand::Rng::new();

    let batch = match prepare_batch(&settings, today, &mut rng) {
        Ok(batch) => batch,
        Err(err @ (Error::MissingDirectory(_) | Error::NotEnoughVideos { .. })) => {
            warn!("Nothing to upload today: {err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let up = &settings.uploader;
    let session = Session::authenticate(http_client()?, &up.client_secret_path, &up.token_path)?;
    let publisher = YoutubeUploader::new(session, up.chunk_size);

    let plan = batch.plan(up, &mut rng)?;
    for upload in &plan {
        info!("{} will be published at {}", upload.video.display(), upload.slot);
    }

    let mut scheduler = Scheduler::new(clock);
    schedule_uploads(&mut scheduler, plan, &publisher);

    scheduler.run_forever(settings.poll_interval())
}
