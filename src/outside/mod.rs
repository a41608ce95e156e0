mod command;
mod ytdl;

pub use ytdl::{VideoFetcher, Ytdl};
