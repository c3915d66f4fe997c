//! Persistent job and video store (SQLite via sqlx).
//!
//! Holds the `videos` table written by the scraper and the worker, and the
//! `download_jobs` table that the claim protocol hands out. Every status
//! transition is a single conditional statement or a short write-locked
//! transaction, so several worker processes can share one database file.

mod db;
mod jobs;
mod types;
mod videos;

pub use db::*;
pub use types::*;
