pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod downloader;
pub mod error;
pub mod fetch_head;
pub mod http;
pub mod queue_db;
pub mod resolver;
pub mod storage;
pub mod worker;
