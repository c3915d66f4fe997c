//! Page scrape: GET the HTML and look for an embedded media URL.

use anyhow::bail;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::scan::find_in_html;
use super::{blocking, ResolveStrategy, ResolveTarget, ResolvedMedia};
use crate::http::{self, HttpSettings};
use crate::queue_db::MediaMeta;

pub struct PageScrape {
    http: HttpSettings,
    timeout: Duration,
}

impl PageScrape {
    pub fn new(http: HttpSettings, timeout: Duration) -> Self {
        PageScrape { http, timeout }
    }
}

#[async_trait]
impl ResolveStrategy for PageScrape {
    fn name(&self) -> &'static str {
        "page_scrape"
    }

    async fn resolve(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ResolvedMedia>> {
        let url = target.page_url.clone();
        let settings = self.http.clone();
        let timeout = self.timeout;
        let cancel = cancel.clone();
        let page = blocking(move || {
            http::get_text(&url, &BTreeMap::new(), &settings, timeout, &cancel)
        })
        .await?;

        if !(200..300).contains(&page.status) {
            bail!("page returned HTTP {}", page.status);
        }
        let Some((url, hit)) = find_in_html(&page.body, &page.effective_url) else {
            return Ok(None);
        };

        let mut meta = MediaMeta {
            source: Some(self.name().to_string()),
            ..MediaMeta::default()
        };
        // The CDN usually checks the page it was embedded in.
        meta.headers
            .insert("Referer".to_string(), page.effective_url.clone());
        meta.extra
            .insert("found_in".to_string(), hit.as_str().to_string());
        Ok(Some(ResolvedMedia { url, meta }))
    }
}
