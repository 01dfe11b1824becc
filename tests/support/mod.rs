//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tilescope::core::geo::Point;
use tilescope::tiles::position::TileXY;
use tilescope::tiles::{TileJob, TileLoadListener, TileLoader, TileOutcome, TileRequest, TileSource, TmsSource};
use tilescope::Viewport;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn solid_tile(color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(256, 256, Rgba(color))
}

pub fn loaded() -> TileOutcome {
    TileOutcome::Loaded(solid_tile([30, 140, 60, 255]))
}

pub fn test_source() -> Arc<dyn TileSource> {
    Arc::new(TmsSource::new("test", "https://tiles.test/{z}/{x}/{y}.png"))
}

/// A `width` x `height` Web Mercator view at `zoom` centred on fractional
/// tile coordinates
pub fn view_on_tile(x: f64, y: f64, zoom: u8, width: f64, height: f64) -> Viewport {
    let center = test_source().tile_xy_to_lat_lng(&TileXY::new(x, y, zoom));
    Viewport::for_zoom(center, zoom as f64, Point::new(width, height))
}

/// 512x512 view at zoom 10 centred on the shared corner of tiles
/// (512..=513, 340..=341)
pub fn two_by_two_view() -> Viewport {
    view_on_tile(513.0, 341.0, 10, 512.0, 512.0)
}

#[derive(Default)]
struct LoaderState {
    pending: Mutex<Vec<(TileRequest, Arc<dyn TileLoadListener>)>>,
    submitted: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Loader whose jobs only finish when the test completes them
#[derive(Default)]
pub struct RecordingLoader {
    state: Arc<LoaderState>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submitted(&self) -> usize {
        self.state.submitted.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }

    pub fn pending_requests(&self) -> Vec<TileRequest> {
        self.state
            .pending
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Finish every pending job; returns how many were finished
    pub fn complete_all(&self, outcome: impl Fn(&TileRequest) -> TileOutcome) -> usize {
        let drained: Vec<_> = self.state.pending.lock().unwrap().drain(..).collect();
        for (request, listener) in &drained {
            listener.tile_loading_finished(request, outcome(request));
        }
        drained.len()
    }
}

struct RecordingJob {
    request: TileRequest,
    listener: Arc<dyn TileLoadListener>,
    state: Arc<LoaderState>,
}

impl TileJob for RecordingJob {
    fn submit(&self, _force: bool) {
        self.state.submitted.fetch_add(1, Ordering::SeqCst);
        self.state
            .pending
            .lock()
            .unwrap()
            .push((self.request.clone(), Arc::clone(&self.listener)));
    }

    fn cancel(&self) {
        self.state.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

impl TileLoader for RecordingLoader {
    fn create_job(&self, request: TileRequest, listener: Arc<dyn TileLoadListener>) -> Box<dyn TileJob> {
        Box::new(RecordingJob {
            request,
            listener,
            state: Arc::clone(&self.state),
        })
    }
}
