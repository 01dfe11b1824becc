//! Drives population of a [`TileCache`]: creates and deduplicates fetch jobs,
//! applies their results and owns the layer's memory reservation.

use crate::core::config::{ScreenSize, TileLayerConfig};
use crate::core::constants::{BYTES_PER_PIXEL, CACHE_SIZE_MULTIPLIER, MAX_TILES_SPANNED};
use crate::core::events::{ChangeTracker, EventBus, TileEvent};
use crate::prelude::{Arc, HashMap, Mutex};
use crate::tiles::cache::{CacheStats, CachedTile, TileCache, TileState};
use crate::tiles::job::{TileJob, TileLoadListener, TileLoader, TileOutcome, TileRequest};
use crate::tiles::memory::{MemoryHandle, MemoryManager};
use crate::tiles::position::{TilePosition, TileRange};
use crate::tiles::source::TileSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Result of [`TileManager::ensure_loaded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Jobs submitted (possibly zero when everything is already requested)
    Submitted(usize),
    /// The range is too large to fetch; nothing submitted
    RejectedTooLarge,
    /// No memory reservation; nothing submitted
    MemoryUnavailable,
}

/// Display classification of a single tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Visible,
    Missing,
    Loading,
    Overzoomed,
    Failed,
}

impl TileStatus {
    pub fn of(state: &TileState) -> Self {
        match state {
            TileState::Loaded(_) => TileStatus::Visible,
            TileState::Missing => TileStatus::Missing,
            TileState::Loading(_) => TileStatus::Loading,
            TileState::Overzoomed => TileStatus::Overzoomed,
            TileState::Error(_) => TileStatus::Failed,
        }
    }
}

/// Aggregated tile status over a range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileSetInfo {
    pub total: usize,
    pub visible: usize,
    pub missing: usize,
    pub loading: usize,
    pub overzoomed: usize,
    pub failed: usize,
}

impl TileSetInfo {
    pub fn has_visible(&self) -> bool {
        self.visible > 0
    }

    pub fn has_loading(&self) -> bool {
        self.loading > 0
    }

    pub fn has_overzoomed(&self) -> bool {
        self.overzoomed > 0
    }

    /// Nothing left to fetch or wait for
    pub fn has_all_loaded(&self) -> bool {
        self.missing == 0 && self.loading == 0
    }

    fn count(&mut self, status: TileStatus) {
        match status {
            TileStatus::Visible => self.visible += 1,
            TileStatus::Missing => self.missing += 1,
            TileStatus::Loading => self.loading += 1,
            TileStatus::Overzoomed => self.overzoomed += 1,
            TileStatus::Failed => self.failed += 1,
        }
    }
}

/// Number of tiles the cache should hold for a screen of `screen` pixels.
///
/// Counts the tiles a screen can partially show, multiplies by
/// [`CACHE_SIZE_MULTIPLIER`] for neighbouring levels and scales by
/// `2^zoom_offset`.
pub fn cache_capacity(screen: ScreenSize, tile_size: u32, zoom_offset: i32) -> usize {
    let ts = tile_size.max(1) as f64;
    let rows = (screen.height as f64 / ts + 1.0).ceil();
    let cols = (screen.width as f64 / ts + 1.0).ceil();
    let visible = rows * cols;
    let capacity = (2_f64.powi(zoom_offset) * visible * CACHE_SIZE_MULTIPLIER).ceil();
    (capacity as usize).max(1)
}

struct Outstanding {
    ticket: u64,
    job: Arc<dyn TileJob>,
}

struct ManagerInner {
    source: Arc<dyn TileSource>,
    loader: Arc<dyn TileLoader>,
    cache: TileCache,
    memory: MemoryManager,
    reservation: Mutex<Option<MemoryHandle>>,
    outstanding: Mutex<HashMap<TilePosition, Outstanding>>,
    next_ticket: AtomicU64,
    headers: Vec<(String, String)>,
    bus: EventBus,
    changes: ChangeTracker,
}

impl ManagerInner {
    fn complete(&self, position: TilePosition, ticket: u64, outcome: TileOutcome) -> bool {
        if let Ok(mut outstanding) = self.outstanding.lock() {
            if outstanding.get(&position).map(|o| o.ticket) == Some(ticket) {
                outstanding.remove(&position);
            }
        }

        let failure = match &outcome {
            TileOutcome::Failed(message) => Some(message.clone()),
            _ => None,
        };

        let applied = self
            .cache
            .peek(&position)
            .map(|tile| tile.complete(ticket, outcome))
            .unwrap_or(false);

        if !applied {
            log::trace!("ignoring stale completion for {} (ticket {})", position, ticket);
            return false;
        }

        if let Some(message) = failure {
            log::debug!("tile {} failed: {}", position, message);
            self.bus.publish(TileEvent::TileFailed { position, message });
        }
        self.changes.mark_changed(&self.bus);
        true
    }
}

struct CompletionListener {
    inner: Weak<ManagerInner>,
}

impl TileLoadListener for CompletionListener {
    fn tile_loading_finished(&self, request: &TileRequest, outcome: TileOutcome) {
        if let Some(inner) = self.inner.upgrade() {
            inner.complete(request.key.position, request.ticket, outcome);
        }
    }
}

/// Tile cache plus loader glue for one tile source
pub struct TileManager {
    inner: Arc<ManagerInner>,
    listener: Arc<dyn TileLoadListener>,
}

impl TileManager {
    /// Cache capacity is derived from the configured screen size and zoom
    /// offset
    pub fn new(
        source: Arc<dyn TileSource>,
        loader: Arc<dyn TileLoader>,
        memory: MemoryManager,
        config: &TileLayerConfig,
        bus: EventBus,
    ) -> Self {
        let capacity = cache_capacity(config.screen_size, source.tile_size(), config.zoom_offset);
        Self::with_capacity(source, loader, memory, capacity, config.header_pairs(), bus)
    }

    pub fn with_capacity(
        source: Arc<dyn TileSource>,
        loader: Arc<dyn TileLoader>,
        memory: MemoryManager,
        capacity: usize,
        headers: Vec<(String, String)>,
        bus: EventBus,
    ) -> Self {
        let cache = TileCache::new(source.name(), capacity);
        log::debug!(
            "tile manager for '{}' with capacity {} tiles",
            source.name(),
            cache.capacity()
        );

        let inner = Arc::new(ManagerInner {
            source,
            loader,
            cache,
            memory,
            reservation: Mutex::new(None),
            outstanding: Mutex::new(HashMap::default()),
            next_ticket: AtomicU64::new(1),
            headers,
            bus,
            changes: ChangeTracker::new(),
        });
        let listener: Arc<dyn TileLoadListener> = Arc::new(CompletionListener {
            inner: Arc::downgrade(&inner),
        });

        Self { inner, listener }
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.inner.source
    }

    pub fn cache(&self) -> &TileCache {
        &self.inner.cache
    }

    pub fn capacity(&self) -> usize {
        self.inner.cache.capacity()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn changes(&self) -> &ChangeTracker {
        &self.inner.changes
    }

    /// Bytes the cache needs: four bytes per pixel for every cached tile
    pub fn estimated_cache_size(&self) -> usize {
        let ts = self.inner.source.tile_size() as usize;
        BYTES_PER_PIXEL * ts * ts * self.capacity()
    }

    /// Reserve the cache's memory budget. Returns false, and publishes
    /// [`TileEvent::MemoryUnavailable`], when the reservation fails.
    pub fn allocate(&self) -> bool {
        let Ok(mut reservation) = self.inner.reservation.lock() else {
            return false;
        };
        if reservation.is_some() {
            return true;
        }

        let bytes = self.estimated_cache_size();
        match self.inner.memory.allocate(self.inner.source.name(), bytes) {
            Ok(handle) => {
                *reservation = Some(handle);
                true
            }
            Err(err) => {
                log::warn!("tile cache for '{}' disabled: {}", self.inner.source.name(), err);
                drop(reservation);
                self.inner.bus.publish(TileEvent::MemoryUnavailable { requested: bytes });
                false
            }
        }
    }

    pub fn has_memory(&self) -> bool {
        self.inner
            .reservation
            .lock()
            .map(|reservation| reservation.is_some())
            .unwrap_or(false)
    }

    /// Release the memory reservation
    pub fn free(&self) {
        if let Ok(mut reservation) = self.inner.reservation.lock() {
            if let Some(mut handle) = reservation.take() {
                handle.free();
            }
        }
    }

    /// Existing entry for `position`, or a new `Missing` one
    pub fn get_or_create(&self, position: TilePosition) -> Arc<CachedTile> {
        self.inner.cache.get_or_create(position)
    }

    /// Existing entry, marked recently used
    pub fn get(&self, position: &TilePosition) -> Option<Arc<CachedTile>> {
        self.inner.cache.get(position)
    }

    pub fn classify(&self, tile: &CachedTile) -> TileStatus {
        TileStatus::of(&tile.state())
    }

    /// Classification of a position; positions without an entry are missing
    pub fn status_at(&self, position: &TilePosition) -> TileStatus {
        self.inner
            .cache
            .peek(position)
            .map(|tile| self.classify(&tile))
            .unwrap_or(TileStatus::Missing)
    }

    /// Count tile states over `range` without creating entries
    pub fn tile_set_info(&self, range: &TileRange) -> TileSetInfo {
        let mut info = TileSetInfo {
            total: range.size(),
            ..TileSetInfo::default()
        };
        if range.is_empty() {
            return info;
        }

        if range.size() > self.inner.cache.len() {
            let mut known = 0;
            for tile in self.inner.cache.entries() {
                if range.contains(&tile.position()) {
                    known += 1;
                    info.count(self.classify(&tile));
                }
            }
            info.missing += info.total - known;
        } else {
            for position in range.tile_positions() {
                info.count(self.status_at(&position));
            }
        }
        info
    }

    /// True when `range` must not be fetched in one go
    pub fn is_too_large(&self, range: &TileRange) -> bool {
        range.tiles_spanned() > MAX_TILES_SPANNED || range.size() > self.capacity()
    }

    /// Submit fetch jobs for every tile of `range` that needs one, centre
    /// tiles first
    pub fn ensure_loaded(&self, range: &TileRange, force: bool) -> LoadOutcome {
        if !self.has_memory() {
            return LoadOutcome::MemoryUnavailable;
        }
        if self.is_too_large(range) {
            log::warn!(
                "not loading {}: {} tiles exceed the limit (capacity {})",
                range,
                range.size(),
                self.capacity()
            );
            return LoadOutcome::RejectedTooLarge;
        }

        let submitted = range
            .tile_positions_sorted()
            .into_iter()
            .filter(|position| self.submit(*position, force))
            .count();
        if submitted > 0 {
            log::debug!("submitted {} tile jobs for {}", submitted, range);
        }
        LoadOutcome::Submitted(submitted)
    }

    /// Request a single tile; returns whether a job was submitted
    pub fn load_tile(&self, position: TilePosition, force: bool) -> bool {
        self.has_memory() && position.is_valid() && self.submit(position, force)
    }

    /// Re-request every tile whose last fetch failed
    pub fn reload_errors(&self) -> usize {
        if !self.has_memory() {
            return 0;
        }
        let failed: Vec<TilePosition> = self
            .inner
            .cache
            .entries()
            .into_iter()
            .filter(|tile| tile.has_error())
            .map(|tile| tile.position())
            .collect();

        let count = failed
            .into_iter()
            .filter(|position| self.submit(*position, true))
            .count();
        log::info!("reloading {} failed tiles", count);
        count
    }

    /// Apply a job result. Callable from any thread; results carrying a
    /// ticket that is no longer current are dropped.
    pub fn on_job_complete(&self, position: TilePosition, ticket: u64, outcome: TileOutcome) -> bool {
        self.inner.complete(position, ticket, outcome)
    }

    /// Cancel every outstanding job and revert its entry to `Missing`
    pub fn cancel_outstanding(&self) -> usize {
        let drained: Vec<(TilePosition, Outstanding)> = match self.inner.outstanding.lock() {
            Ok(mut outstanding) => outstanding.drain().collect(),
            Err(_) => return 0,
        };

        for (position, job) in &drained {
            job.job.cancel();
            if let Some(tile) = self.inner.cache.peek(position) {
                tile.abandon(job.ticket);
            }
        }

        let count = drained.len();
        if count > 0 {
            log::debug!("cancelled {} outstanding tile jobs", count);
            self.inner.bus.publish(TileEvent::JobsCancelled { count });
        }
        count
    }

    pub fn outstanding_count(&self) -> usize {
        self.inner
            .outstanding
            .lock()
            .map(|outstanding| outstanding.len())
            .unwrap_or(0)
    }

    /// Flush every cached tile that is not loading
    pub fn clear_cache(&self) -> usize {
        let removed = self.inner.cache.clear();
        log::info!("cleared {} tiles from '{}'", removed, self.inner.source.name());
        if removed > 0 {
            self.inner.changes.mark_changed(&self.inner.bus);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    fn submit(&self, position: TilePosition, force: bool) -> bool {
        let tile = self.inner.cache.get_or_create(position);
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        if !tile.begin_loading(ticket, force) {
            return false;
        }

        let request = TileRequest {
            key: self.inner.cache.key(position),
            url: self.inner.source.tile_url(position),
            headers: self.inner.headers.clone(),
            ticket,
        };
        let job: Arc<dyn TileJob> =
            Arc::from(self.inner.loader.create_job(request, Arc::clone(&self.listener)));

        if let Ok(mut outstanding) = self.inner.outstanding.lock() {
            outstanding.insert(
                position,
                Outstanding {
                    ticket,
                    job: Arc::clone(&job),
                },
            );
        }
        job.submit(force);
        true
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("source", &self.inner.source.name())
            .field("capacity", &self.capacity())
            .field("outstanding", &self.outstanding_count())
            .finish()
    }
}
