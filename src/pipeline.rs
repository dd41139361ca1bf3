use crate::cache::ImageCache;
use crate::fetcher::{fetch_with_fallback, ImageFetcher};
use crate::referer::RefererResolver;
use crate::stats::ProxyStats;
use crate::transform::{self, OutputFormat};
use crate::util::{ProxyError, Result};
use bytes::Bytes;
use log::{debug, info};
use std::sync::Arc;
use url::Url;

/// one inbound transcode request, parsed by the transport shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub target_url: String,
    /// encoder quality, already clamped to [1,100]
    pub quality: u8,
    pub format: OutputFormat,
    pub grayscale: bool,
}

impl ImageRequest {
    /// deterministic key over all four request fields. identical requests
    /// collide; changing any field changes the key.
    pub fn cache_key(&self) -> String {
        format!(
            "{}-q{}-{}-{}",
            self.target_url,
            self.quality,
            self.format.key_token(),
            if self.grayscale { "bw" } else { "color" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// pipeline output handed to the transport shell. size fields are only
/// known when the payload was produced by a fresh transform.
#[derive(Debug)]
pub struct PipelineResponse {
    pub payload: Bytes,
    pub content_type: String,
    pub cache_status: CacheStatus,
    pub original_size: Option<usize>,
    pub compressed_size: Option<usize>,
    pub bytes_saved: Option<u64>,
}

/// orchestrates resolver -> cache probe -> fetch (with 403 fallback retry)
/// -> transform -> cache write, and owns the metrics bookkeeping. holds its
/// collaborators explicitly so several independent pipelines can coexist.
pub struct ImagePipeline {
    fetcher: Arc<dyn ImageFetcher>,
    cache: Arc<ImageCache>,
    stats: Arc<ProxyStats>,
    resolver: RefererResolver,
}

impl ImagePipeline {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        cache: Arc<ImageCache>,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            stats,
            resolver: RefererResolver::new(),
        }
    }

    /// every outcome counts toward `requests`; only a served cached payload
    /// counts as a hit and only a completed transform counts as a miss.
    pub async fn handle(&self, request: &ImageRequest) -> Result<PipelineResponse> {
        match self.run(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ImageRequest) -> Result<PipelineResponse> {
        let target = Url::parse(&request.target_url)?;
        let host = target
            .host_str()
            .ok_or_else(|| ProxyError::InvalidInput("target url has no host".to_string()))?
            .to_string();

        let key = request.cache_key();
        if let Some(cached) = self.cache.get(&key) {
            debug!("cache hit for {}", key);
            self.stats.record_hit();
            return Ok(PipelineResponse {
                payload: cached.payload,
                content_type: cached.content_type,
                cache_status: CacheStatus::Hit,
                original_size: None,
                compressed_size: None,
                bytes_saved: None,
            });
        }

        let referer = self.resolver.resolve(&host, &request.target_url);
        info!("fetching {} | q={}", host, request.quality);

        let fetched = fetch_with_fallback(self.fetcher.as_ref(), &target, &referer).await?;
        let original_size = fetched.body.len();

        let payload = transform::transcode(
            &fetched.body,
            request.format,
            request.quality,
            request.grayscale,
        )?;
        let compressed_size = payload.len();

        // size growth contributes zero, never a negative adjustment
        let bytes_saved = original_size.saturating_sub(compressed_size) as u64;
        if bytes_saved > 0 {
            self.stats.add_bytes_saved(bytes_saved);
        }

        let content_type = request.format.content_type().to_string();
        self.cache
            .insert(key, payload.clone(), content_type.clone());
        self.stats.record_miss();

        Ok(PipelineResponse {
            payload,
            content_type,
            cache_status: CacheStatus::Miss,
            original_size: Some(original_size),
            compressed_size: Some(compressed_size),
            bytes_saved: Some(bytes_saved),
        })
    }

    /// zeroes the counters and flushes the cache together, so reported
    /// stats and cache contents never diverge.
    pub fn reset(&self) {
        self.stats.reset();
        self.cache.flush_all();
    }
}
