#![cfg(feature = "tokio-runtime")]

mod support;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::*;
use tilescope::core::config::TileLayerConfig;
use tilescope::core::events::{EventBus, TileEvent};
use tilescope::rendering::RenderContext;
use tilescope::runtime::TokioSpawner;
use tilescope::tiles::{
    AsyncTileLoader, BingSource, FetchResponse, LoadOutcome, MemoryManager, TileFetcher, TileLoaderConfig,
    TileManager, TilePosition, TileRequest, TileSource, TileStatus,
};
use tilescope::TileLayer;

/// Scripted transport: per-URL queues of responses, then a default
struct FakeFetcher {
    scripted: Mutex<HashMap<String, VecDeque<FetchResponse>>>,
    fallback: FetchResponse,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn new(fallback: FetchResponse) -> Arc<Self> {
        Self::with_delay(fallback, Duration::ZERO)
    }

    fn with_delay(fallback: FetchResponse, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(HashMap::new()),
            fallback,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn script(&self, url: String, responses: Vec<FetchResponse>) {
        self.scripted.lock().unwrap().insert(url, responses.into());
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileFetcher for FakeFetcher {
    async fn fetch(&self, request: &TileRequest, _force: bool) -> tilescope::Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(solid_tile([200, 100, 50, 255]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn status(code: u16) -> FetchResponse {
    FetchResponse {
        status: code,
        ..FetchResponse::default()
    }
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..300 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn manager_for(source: Arc<dyn TileSource>, fetcher: Arc<FakeFetcher>, config: TileLoaderConfig) -> TileManager {
    init_logging();
    let spawner = Arc::new(TokioSpawner::current().unwrap());
    let loader = Arc::new(AsyncTileLoader::with_fetcher(spawner, Arc::clone(&source), fetcher, config));
    let manager = TileManager::new(
        source,
        loader,
        MemoryManager::unlimited(),
        &TileLayerConfig::default(),
        EventBus::new(),
    );
    assert!(manager.allocate());
    manager
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_layer_paints_tiles_fetched_in_background() {
    let source = test_source();
    let fetcher = FakeFetcher::new(FetchResponse::ok(png_bytes()));
    let spawner = Arc::new(TokioSpawner::current().unwrap());
    let loader = Arc::new(AsyncTileLoader::with_fetcher(
        spawner,
        Arc::clone(&source),
        fetcher.clone(),
        TileLoaderConfig::for_testing(),
    ));
    let mut layer = TileLayer::new(source, loader, MemoryManager::unlimited(), TileLayerConfig::default()).unwrap();
    let viewport = two_by_two_view();

    let first = layer.paint(&viewport, &mut RenderContext::new(512, 512));
    assert_eq!(first.load, Some(LoadOutcome::Submitted(4)));

    wait_for(|| layer.stats().loaded == 4 && layer.needs_repaint()).await;
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(layer.manager().outstanding_count(), 0);

    let mut surface = RenderContext::new(512, 512);
    let second = layer.paint(&viewport, &mut surface);
    assert_eq!(second.tiles_drawn, 4);
    assert_eq!(surface.image_count(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_errors_are_retried() {
    let source = test_source();
    let position = TilePosition::new(1, 2, 3);
    let fetcher = FakeFetcher::new(FetchResponse::ok(png_bytes()));
    fetcher.script(source.tile_url(position), vec![status(503)]);
    let config = TileLoaderConfig {
        max_retries: 2,
        ..TileLoaderConfig::for_testing()
    };
    let manager = manager_for(source, fetcher.clone(), config);

    assert!(manager.load_tile(position, false));
    wait_for(|| manager.status_at(&position) != TileStatus::Loading).await;

    assert_eq!(manager.status_at(&position), TileStatus::Visible);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_errors_mark_tile_failed() {
    let fetcher = FakeFetcher::new(status(404));
    let manager = manager_for(test_source(), fetcher.clone(), TileLoaderConfig::default());
    let (_, events) = manager.bus().subscribe_channel();
    let position = TilePosition::new(4, 4, 4);

    manager.load_tile(position, false);
    wait_for(|| manager.status_at(&position) == TileStatus::Failed).await;

    assert_eq!(fetcher.calls(), 1);
    assert!(events.try_iter().any(|event| event
        == TileEvent::TileFailed {
            position,
            message: "HTTP 404".to_string()
        }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bing_marker_means_no_tile() {
    let marker = FetchResponse {
        status: 200,
        headers: vec![("x-ve-tile-info".to_string(), "no-tile".to_string())],
        body: Vec::new(),
    };
    let fetcher = FakeFetcher::new(marker);
    let manager = manager_for(Arc::new(BingSource::aerial()), fetcher, TileLoaderConfig::for_testing());
    let position = TilePosition::new(5, 9, 19);

    manager.load_tile(position, false);
    wait_for(|| manager.status_at(&position) != TileStatus::Loading).await;

    assert_eq!(manager.status_at(&position), TileStatus::Overzoomed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_fetch_result_is_discarded() {
    let fetcher = FakeFetcher::with_delay(FetchResponse::ok(png_bytes()), Duration::from_millis(100));
    let manager = manager_for(test_source(), fetcher.clone(), TileLoaderConfig::for_testing());
    let position = TilePosition::new(2, 2, 3);

    manager.load_tile(position, false);
    assert_eq!(manager.cancel_outstanding(), 1);
    assert_eq!(manager.status_at(&position), TileStatus::Missing);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.status_at(&position), TileStatus::Missing);
    assert!(!manager.changes().is_pending());
}
