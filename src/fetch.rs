//! Challenge image download and per-attempt staging.

use crate::error::Result;
use crate::models::SolverConfig;
use rquest::{Client, Proxy};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://app.rainyun.com/";
const RETRY_PAUSE: Duration = Duration::from_millis(200);

/// Staging names used across the pipeline.
pub const BACKGROUND_KEY: &str = "captcha.jpg";
pub const SPRITE_KEY: &str = "sprite.jpg";

/// In-memory staging area for one solve attempt.
///
/// Replaces the shared `temp/` directory of earlier revisions: every attempt
/// owns its own arena keyed by a fresh id, so parallel solves against
/// different accounts can never race on the same paths. Cleared at the start
/// of each acquisition, dropped with the attempt.
pub struct ScratchArena {
    attempt_id: Uuid,
    files: HashMap<String, Vec<u8>>,
}

impl ScratchArena {
    pub fn new() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            files: HashMap::new(),
        }
    }

    /// Discard everything staged so far and issue a new attempt id.
    pub fn begin_attempt(&mut self) {
        self.files.clear();
        self.attempt_id = Uuid::new_v4();
        tracing::debug!(attempt = %self.attempt_id, "scratch arena cleared");
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn put(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for ScratchArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Downloads challenge images with browser-like headers.
pub struct ImageFetcher {
    client: Client,
    retries: u32,
    min_bytes: usize,
}

impl ImageFetcher {
    /// Build a fetcher from the solver config, optionally routed through a
    /// proxy.
    pub fn new(config: &SolverConfig, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(10));
        if let Some(proxy_url) = proxy {
            builder = builder.proxy(Proxy::all(proxy_url)?);
        }
        Ok(Self {
            client: builder.build()?,
            retries: config.download_retries,
            min_bytes: config.min_image_bytes,
        })
    }

    /// Download one image, retrying on transient failures.
    ///
    /// A response only counts when the status is 200 and the payload is
    /// larger than the configured minimum; the challenge CDN sometimes
    /// answers 200 with a tiny error body.
    pub async fn download(&self, url: &str) -> Option<Vec<u8>> {
        for attempt in 0..self.retries {
            match self.try_download(url).await {
                Ok(Some(bytes)) => {
                    tracing::debug!(url, size = bytes.len(), "image downloaded");
                    return Some(bytes);
                }
                Ok(None) => {
                    tracing::debug!(url, attempt, "image payload rejected, retrying");
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "download retry");
                }
            }
            tokio::time::sleep(RETRY_PAUSE).await;
        }
        tracing::error!(url, "image download failed after {} attempts", self.retries);
        None
    }

    async fn try_download(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Referer", REFERER)
            .send()
            .await?;
        if resp.status().as_u16() != 200 {
            return Ok(None);
        }
        let bytes = resp.bytes().await?.to_vec();
        if bytes.len() <= self.min_bytes {
            return Ok(None);
        }
        Ok(Some(bytes))
    }
}
