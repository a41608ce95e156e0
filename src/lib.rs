//! Short-form video relay.
//!
//! The downloader fills `downloads/YYYY-MM-DD` with a handful of fresh videos
//! every day, the uploader publishes that batch at fixed times of the day.

pub mod cli;
pub mod config;
pub mod download;
pub mod downloader;
pub mod io;
pub mod logging;
pub mod outside;
pub mod result;
pub mod schedule;
pub mod types;
pub mod upload;
pub mod uploader;
pub mod youtube;
