//! Tests for add-video, enqueue, retry, status and delete.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_add_video() {
    match parse(&["vidq", "add-video", "7301", "https://www.example.com/@u/video/7301"]) {
        CliCommand::AddVideo {
            external_id,
            page_url,
            title,
            direct_url,
        } => {
            assert_eq!(external_id, "7301");
            assert_eq!(page_url, "https://www.example.com/@u/video/7301");
            assert!(title.is_none());
            assert!(direct_url.is_none());
        }
        _ => panic!("expected AddVideo"),
    }
}

#[test]
fn cli_parse_add_video_with_options() {
    match parse(&[
        "vidq",
        "add-video",
        "7302",
        "https://www.example.com/@u/video/7302",
        "--title",
        "dance",
        "--direct-url",
        "https://cdn.example.com/7302.mp4",
    ]) {
        CliCommand::AddVideo {
            title, direct_url, ..
        } => {
            assert_eq!(title.as_deref(), Some("dance"));
            assert_eq!(direct_url.as_deref(), Some("https://cdn.example.com/7302.mp4"));
        }
        _ => panic!("expected AddVideo with options"),
    }
}

#[test]
fn cli_parse_enqueue() {
    match parse(&["vidq", "enqueue", "3"]) {
        CliCommand::Enqueue { video_id } => assert_eq!(video_id, 3),
        _ => panic!("expected Enqueue"),
    }
}

#[test]
fn cli_parse_retry_default_cap() {
    match parse(&["vidq", "retry", "9"]) {
        CliCommand::Retry {
            video_id,
            max_attempts,
        } => {
            assert_eq!(video_id, 9);
            assert_eq!(max_attempts, 3);
        }
        _ => panic!("expected Retry"),
    }
}

#[test]
fn cli_parse_retry_custom_cap() {
    match parse(&["vidq", "retry", "9", "--max-attempts", "5"]) {
        CliCommand::Retry { max_attempts, .. } => assert_eq!(max_attempts, 5),
        _ => panic!("expected Retry --max-attempts"),
    }
}

#[test]
fn cli_parse_status_and_delete() {
    assert!(matches!(parse(&["vidq", "status"]), CliCommand::Status));
    match parse(&["vidq", "delete", "11"]) {
        CliCommand::Delete { video_id } => assert_eq!(video_id, 11),
        _ => panic!("expected Delete"),
    }
}
