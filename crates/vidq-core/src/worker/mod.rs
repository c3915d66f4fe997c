//! Worker: claims jobs from the queue and runs the download pipeline.
//!
//! Coordinates the stores and the three stages:
//! claim → load → resolve (extractor) → fetch → upload → record.
//! At most `max_concurrent` jobs run at once per worker process.

mod guard;
mod pipeline;
mod run;

pub use pipeline::{JobOutcome, JobReport, Pipeline};
pub use run::{RunSummary, Worker, WorkerSettings};
