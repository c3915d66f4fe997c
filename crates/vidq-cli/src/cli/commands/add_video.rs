//! `vidq add-video <external_id> <page_url>` – register a discovered video.

use anyhow::{Context, Result};
use vidq_core::queue_db::{NewVideo, QueueDb};

pub async fn run_add_video(
    db: &QueueDb,
    external_id: String,
    page_url: String,
    title: Option<String>,
    direct_url: Option<String>,
) -> Result<()> {
    url::Url::parse(&page_url).with_context(|| format!("invalid page URL: {page_url}"))?;
    if let Some(direct) = &direct_url {
        url::Url::parse(direct).with_context(|| format!("invalid direct URL: {direct}"))?;
    }

    let id = db
        .insert_video(&NewVideo {
            external_id: external_id.clone(),
            title,
            video_url: page_url,
            video_url_direct: direct_url,
            ..NewVideo::default()
        })
        .await
        .with_context(|| format!("add video {external_id}"))?;
    println!("Added video {id} ({external_id})");
    Ok(())
}
