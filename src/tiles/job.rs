//! The boundary between the tile cache and whatever actually fetches tiles.
//!
//! A [`TileLoader`] turns a [`TileRequest`] into a [`TileJob`]; the job runs
//! on the loader's own workers and reports back exactly once through its
//! [`TileLoadListener`], from any thread.

use crate::prelude::Arc;
use crate::tiles::position::TileKey;
use image::RgbaImage;

/// Everything a loader needs to fetch one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub key: TileKey,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Submission ticket, echoed back on completion
    pub ticket: u64,
}

/// How a fetch ended
#[derive(Debug, Clone)]
pub enum TileOutcome {
    Loaded(RgbaImage),
    /// The source has no data for this tile at this zoom level
    NoTileAtZoom,
    Failed(String),
}

impl TileOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileOutcome::Loaded(_))
    }
}

/// Completion callback for tile jobs
pub trait TileLoadListener: Send + Sync {
    fn tile_loading_finished(&self, request: &TileRequest, outcome: TileOutcome);
}

/// A single fetch; created by a [`TileLoader`], owned by the cache until it
/// reports back
pub trait TileJob: Send + Sync {
    /// Start the fetch. `force` bypasses any cache below the loader.
    fn submit(&self, force: bool);

    /// Advisory: the result is no longer wanted
    fn cancel(&self);
}

/// Job factory; the loader owns workers, retries and the wire protocol
pub trait TileLoader: Send + Sync {
    fn create_job(&self, request: TileRequest, listener: Arc<dyn TileLoadListener>) -> Box<dyn TileJob>;
}

/// Loader that produces tiles synchronously on the submitting thread from a
/// closure; useful for generated or in-memory tiles
pub struct FnLoader<F> {
    produce: Arc<F>,
}

impl<F> FnLoader<F>
where
    F: Fn(&TileRequest) -> TileOutcome + Send + Sync + 'static,
{
    pub fn new(produce: F) -> Self {
        Self {
            produce: Arc::new(produce),
        }
    }
}

struct FnJob<F> {
    request: TileRequest,
    listener: Arc<dyn TileLoadListener>,
    produce: Arc<F>,
}

impl<F> TileJob for FnJob<F>
where
    F: Fn(&TileRequest) -> TileOutcome + Send + Sync + 'static,
{
    fn submit(&self, _force: bool) {
        let outcome = (self.produce)(&self.request);
        self.listener.tile_loading_finished(&self.request, outcome);
    }

    fn cancel(&self) {}
}

impl<F> TileLoader for FnLoader<F>
where
    F: Fn(&TileRequest) -> TileOutcome + Send + Sync + 'static,
{
    fn create_job(&self, request: TileRequest, listener: Arc<dyn TileLoadListener>) -> Box<dyn TileJob> {
        Box::new(FnJob {
            request,
            listener,
            produce: Arc::clone(&self.produce),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Mutex;
    use crate::tiles::position::TilePosition;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, bool)>>,
    }

    impl TileLoadListener for Recorder {
        fn tile_loading_finished(&self, request: &TileRequest, outcome: TileOutcome) {
            self.seen.lock().unwrap().push((request.ticket, outcome.is_loaded()));
        }
    }

    #[test]
    fn test_fn_loader_reports_once_per_submit() {
        let loader = FnLoader::new(|request: &TileRequest| {
            if request.key.position.zoom > 3 {
                TileOutcome::NoTileAtZoom
            } else {
                TileOutcome::Loaded(RgbaImage::new(1, 1))
            }
        });
        let recorder = Arc::new(Recorder::default());

        let request = |zoom, ticket| TileRequest {
            key: TileKey::new("t", TilePosition::new(0, 0, zoom)),
            url: String::new(),
            headers: Vec::new(),
            ticket,
        };

        loader.create_job(request(2, 1), recorder.clone()).submit(false);
        loader.create_job(request(5, 2), recorder.clone()).submit(false);

        assert_eq!(*recorder.seen.lock().unwrap(), vec![(1, true), (2, false)]);
    }
}
