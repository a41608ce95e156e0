use std::path::PathBuf;

use time::Date;
use tracing::info;

use crate::{
    config::Settings,
    io::date_directory,
    result::Result,
    schedule::{Clock, Scheduler},
    upload::{ScheduledUpload, UploadBatch},
    youtube::VideoPublisher,
};

/// Select the batch of `date`, out of its date directory
pub fn prepare_batch(
    settings: &Settings,
    date: Date,
    rng: &mut fastrand::Rng,
) -> Result<UploadBatch> {
    let dir: PathBuf = date_directory(&settings.downloads_dir, date);
    let batch = UploadBatch::select(&dir, settings.daily_target, rng)?;
    info!("Selected {} videos from {}", batch.len(), dir.display());
    Ok(batch)
}

/// Register one job per planned upload
pub fn schedule_uploads<'a, C: Clock>(
    scheduler: &mut Scheduler<'a, C>,
    plan: Vec<ScheduledUpload>,
    publisher: &'a dyn VideoPublisher,
) {
    let slots: Vec<String> = plan.iter().map(|upload| upload.slot.to_string()).collect();

    for upload in plan {
        let label = format!("upload {} at {}", upload.video.display(), upload.slot);
        scheduler.once_at(upload.slot, label, move |_| {
            publisher.publish(&upload.video, &upload.metadata).map(|_| ())
        });
    }

    info!("Scheduled video posts at {}", slots.join(", "));
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs, path::Path};

    use time::{macros::{date, datetime}, PrimitiveDateTime};

    use super::*;
    use crate::{result::Error, types::VideoMetadata};

    #[derive(Default)]
    struct RecordingPublisher {
        published: RefCell<Vec<(PathBuf, String)>>,
    }

    impl VideoPublisher for RecordingPublisher {
        fn publish(&self, video: &Path, metadata: &VideoMetadata) -> miette::Result<String> {
            self.published
                .borrow_mut()
                .push((video.to_path_buf(), metadata.title.clone()));
            Ok(format!("id-{}", self.published.borrow().len()))
        }
    }

    struct SharedClock<'c>(&'c RefCell<PrimitiveDateTime>);

    impl Clock for SharedClock<'_> {
        fn now(&self) -> PrimitiveDateTime {
            *self.0.borrow()
        }
    }

    #[test]
    fn missing_day_aborts_preparation() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            downloads_dir: root.path().to_path_buf(),
            ..Settings::default()
        };

        assert!(matches!(
            prepare_batch(&settings, date!(2024 - 01 - 01), &mut fastrand::Rng::new()),
            Err(Error::MissingDirectory(_))
        ));
    }

    #[test]
    fn publishes_each_video_at_its_slot() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("2024-01-01");
        fs::create_dir(&dir).unwrap();
        for i in 1..=5 {
            fs::write(dir.join(format!("v{i}.mp4")), b"").unwrap();
        }
        let settings = Settings {
            downloads_dir: root.path().to_path_buf(),
            ..Settings::default()
        };

        let mut rng = fastrand::Rng::with_seed(5);
        let batch = prepare_batch(&settings, date!(2024 - 01 - 01), &mut rng).unwrap();
        let plan = batch.plan(&settings.uploader, &mut rng).unwrap();

        let now = RefCell::new(datetime!(2024-01-01 00:00:05));
        let publisher = RecordingPublisher::default();
        let mut scheduler = Scheduler::new(SharedClock(&now));
        schedule_uploads(&mut scheduler, plan, &publisher);
        assert_eq!(scheduler.len(), 5);

        *now.borrow_mut() = datetime!(2024-01-01 03:00);
        assert_eq!(scheduler.run_pending(), 1);
        *now.borrow_mut() = datetime!(2024-01-01 12:00);
        assert_eq!(scheduler.run_pending(), 1);
        *now.borrow_mut() = datetime!(2024-01-01 23:00);
        assert_eq!(scheduler.run_pending(), 3);
        assert!(scheduler.is_empty());
        drop(scheduler);

        let published = publisher.published.borrow();
        let titles: Vec<_> = published.iter().map(|(_, title)| title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Epic Gameplay",
                "Gaming Highlights",
                "Best Game Clips",
                "Daily Game",
                "Gaming Tutorial",
            ]
        );
        assert!(published[0].0.ends_with("v1.mp4"));
        assert!(published[4].0.ends_with("v5.mp4"));
    }
}
