//! HEAD probe: the page URL may already be a direct media URL.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{blocking, ResolveStrategy, ResolveTarget, ResolvedMedia};
use crate::fetch_head;
use crate::http::HttpSettings;
use crate::queue_db::MediaMeta;

pub struct DirectProbe {
    http: HttpSettings,
    timeout: Duration,
}

impl DirectProbe {
    pub fn new(http: HttpSettings, timeout: Duration) -> Self {
        DirectProbe { http, timeout }
    }
}

#[async_trait]
impl ResolveStrategy for DirectProbe {
    fn name(&self) -> &'static str {
        "direct_probe"
    }

    async fn resolve(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<ResolvedMedia>> {
        let url = target.page_url.clone();
        let http = self.http.clone();
        let timeout = self.timeout;
        let cancel = cancel.clone();
        let head = blocking(move || {
            fetch_head::probe(&url, &BTreeMap::new(), &http, timeout, &cancel)
        })
        .await?;

        if !head.is_video() {
            return Ok(None);
        }
        let url = head
            .effective_url
            .clone()
            .unwrap_or_else(|| target.page_url.clone());
        Ok(Some(ResolvedMedia {
            url,
            meta: MediaMeta {
                content_type: head.content_type,
                content_length: head.content_length,
                source: Some(self.name().to_string()),
                ..MediaMeta::default()
            },
        }))
    }
}
