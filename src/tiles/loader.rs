//! Asynchronous HTTP tile loader.
//!
//! Jobs run on an [`AsyncSpawner`], share a concurrency limit and retry
//! transport failures. Every submitted job reports back exactly once.

use crate::prelude::{Arc, Duration, Mutex};
use crate::runtime::{spawn, AsyncHandle, AsyncSpawner};
use crate::tiles::job::{TileJob, TileLoadListener, TileLoader, TileOutcome, TileRequest};
use crate::tiles::source::TileSource;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;

/// Shared async HTTP client for tile fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tilescope/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|err| {
            log::warn!("falling back to default HTTP client: {}", err);
            reqwest::Client::new()
        })
});

/// Raw answer of a tile server
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by [`AsyncTileLoader`]
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetch the bytes behind `request`. `force` asks intermediaries not to
    /// answer from their caches.
    async fn fetch(&self, request: &TileRequest, force: bool) -> Result<FetchResponse>;
}

/// reqwest-backed fetcher on the shared client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            timeout,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl TileFetcher for HttpFetcher {
    async fn fetch(&self, request: &TileRequest, force: bool) -> Result<FetchResponse> {
        let mut builder = self.client.get(&request.url).timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if force {
            builder = builder.header("Cache-Control", "no-cache");
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Configuration for the tile loader
#[derive(Debug, Clone)]
pub struct TileLoaderConfig {
    /// Maximum concurrent tile downloads
    pub max_concurrent: usize,
    /// Maximum number of retry attempts per tile
    pub max_retries: usize,
    /// Delay between retry attempts
    pub retry_delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Unified configuration presets for TileLoaderConfig
impl TileLoaderConfig {
    pub fn low_resource() -> Self {
        Self {
            max_concurrent: 2,
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn high_performance() -> Self {
        Self {
            max_concurrent: 32,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_concurrent: 4,
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        }
    }
}

struct LoaderShared {
    spawner: Arc<dyn AsyncSpawner>,
    fetcher: Arc<dyn TileFetcher>,
    source: Arc<dyn TileSource>,
    config: TileLoaderConfig,
    semaphore: Arc<Semaphore>,
}

/// [`TileLoader`] fetching over HTTP on an async runtime
#[derive(Clone)]
pub struct AsyncTileLoader {
    shared: Arc<LoaderShared>,
}

impl AsyncTileLoader {
    pub fn new(spawner: Arc<dyn AsyncSpawner>, source: Arc<dyn TileSource>, config: TileLoaderConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.timeout));
        Self::with_fetcher(spawner, source, fetcher, config)
    }

    pub fn with_fetcher(
        spawner: Arc<dyn AsyncSpawner>,
        source: Arc<dyn TileSource>,
        fetcher: Arc<dyn TileFetcher>,
        config: TileLoaderConfig,
    ) -> Self {
        log::debug!(
            "tile loader for '{}' with max_concurrent: {}",
            source.name(),
            config.max_concurrent
        );
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            shared: Arc::new(LoaderShared {
                spawner,
                fetcher,
                source,
                config,
                semaphore,
            }),
        }
    }

    pub fn config(&self) -> &TileLoaderConfig {
        &self.shared.config
    }

    /// Free download slots right now
    pub fn available_permits(&self) -> usize {
        self.shared.semaphore.available_permits()
    }
}

impl TileLoader for AsyncTileLoader {
    fn create_job(&self, request: TileRequest, listener: Arc<dyn TileLoadListener>) -> Box<dyn TileJob> {
        Box::new(AsyncTileJob {
            request: Arc::new(request),
            listener,
            shared: Arc::clone(&self.shared),
            cancelled: Arc::new(AtomicBool::new(false)),
            submitted: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }
}

/// One HTTP tile fetch
pub struct AsyncTileJob {
    request: Arc<TileRequest>,
    listener: Arc<dyn TileLoadListener>,
    shared: Arc<LoaderShared>,
    cancelled: Arc<AtomicBool>,
    submitted: AtomicBool,
    handle: Mutex<Option<Box<dyn AsyncHandle>>>,
}

impl AsyncTileJob {
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .map(|handle| handle.as_ref().map(|h| h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl TileJob for AsyncTileJob {
    fn submit(&self, force: bool) {
        if self.submitted.swap(true, Ordering::AcqRel) {
            return;
        }

        let request = Arc::clone(&self.request);
        let listener = Arc::clone(&self.listener);
        let shared = Arc::clone(&self.shared);
        let cancelled = Arc::clone(&self.cancelled);
        let spawner = Arc::clone(&shared.spawner);

        let handle = spawn(spawner.as_ref(), async move {
            let outcome = fetch_tile(&shared, &request, force, &cancelled).await;
            listener.tile_loading_finished(&request, outcome);
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

async fn fetch_tile(
    shared: &LoaderShared,
    request: &TileRequest,
    force: bool,
    cancelled: &AtomicBool,
) -> TileOutcome {
    let Ok(_permit) = shared.semaphore.acquire().await else {
        return TileOutcome::Failed("tile loader shut down".to_string());
    };

    let mut last_error = String::from("not attempted");
    for attempt in 0..=shared.config.max_retries {
        if cancelled.load(Ordering::Acquire) {
            return TileOutcome::Failed("cancelled".to_string());
        }
        if attempt > 0 {
            tokio::time::sleep(shared.config.retry_delay).await;
        }

        #[cfg(feature = "debug")]
        log::trace!("fetching {} (attempt {})", request.key, attempt + 1);

        match shared.fetcher.fetch(request, force).await {
            Ok(response) if response.status >= 500 => {
                last_error = format!("HTTP {}", response.status);
            }
            Ok(response) => return interpret(shared.source.as_ref(), request, response),
            Err(err) => {
                log::debug!("fetching {} failed: {}", request.key, err);
                last_error = err.to_string();
            }
        }
    }
    TileOutcome::Failed(last_error)
}

fn interpret(source: &dyn TileSource, request: &TileRequest, response: FetchResponse) -> TileOutcome {
    if source.is_no_tile_response(&response.headers) {
        log::debug!("{} is past the source's depth", request.key);
        return TileOutcome::NoTileAtZoom;
    }
    if !response.is_success() {
        return TileOutcome::Failed(format!("HTTP {}", response.status));
    }

    match image::load_from_memory(&response.body) {
        Ok(image) => TileOutcome::Loaded(image.to_rgba8()),
        Err(err) => TileOutcome::Failed(format!("cannot decode tile: {}", err)),
    }
}
