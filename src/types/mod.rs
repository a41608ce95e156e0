mod candidate;
mod clock_time;
mod metadata;

pub use candidate::VideoCandidate;
pub use clock_time::ClockTime;
pub use metadata::{PrivacyStatus, VideoMetadata};
