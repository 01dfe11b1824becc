use crate::prelude::{Arc, Mutex};
use crate::tiles::job::TileOutcome;
use crate::tiles::position::{TileKey, TilePosition};
use image::RgbaImage;
use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a cache entry
#[derive(Debug, Clone)]
pub enum TileState {
    Missing,
    /// A job carrying this ticket is outstanding
    Loading(u64),
    Loaded(Arc<RgbaImage>),
    Error(String),
    /// The source has no data here; terminal
    Overzoomed,
}

/// One tile of the cache. The state sits behind its own lock so fetch
/// completions never contend on the cache index.
#[derive(Debug)]
pub struct CachedTile {
    position: TilePosition,
    state: Mutex<TileState>,
}

impl CachedTile {
    pub fn new(position: TilePosition) -> Self {
        Self {
            position,
            state: Mutex::new(TileState::Missing),
        }
    }

    pub fn position(&self) -> TilePosition {
        self.position
    }

    /// Snapshot of the current state
    pub fn state(&self) -> TileState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or(TileState::Missing)
    }

    pub fn image(&self) -> Option<Arc<RgbaImage>> {
        match self.state() {
            TileState::Loaded(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state(), TileState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state(), TileState::Loading(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.state(), TileState::Missing)
    }

    pub fn is_overzoomed(&self) -> bool {
        matches!(self.state(), TileState::Overzoomed)
    }

    pub fn has_error(&self) -> bool {
        matches!(self.state(), TileState::Error(_))
    }

    pub fn error_message(&self) -> Option<String> {
        match self.state() {
            TileState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Move to `Loading(ticket)` if the entry may be (re)fetched.
    ///
    /// Plain requests only start from `Missing`; forced requests also
    /// restart loaded and failed tiles. Loading and overzoomed entries are
    /// never restarted.
    pub fn begin_loading(&self, ticket: u64, force: bool) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let allowed = match *state {
            TileState::Missing => true,
            TileState::Loaded(_) | TileState::Error(_) => force,
            TileState::Loading(_) | TileState::Overzoomed => false,
        };
        if allowed {
            *state = TileState::Loading(ticket);
        }
        allowed
    }

    /// Apply a job result; ignored unless the entry is still waiting on
    /// exactly this ticket
    pub fn complete(&self, ticket: u64, outcome: TileOutcome) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if !matches!(*state, TileState::Loading(current) if current == ticket) {
            return false;
        }
        *state = match outcome {
            TileOutcome::Loaded(image) => TileState::Loaded(Arc::new(image)),
            TileOutcome::NoTileAtZoom => TileState::Overzoomed,
            TileOutcome::Failed(message) => TileState::Error(message),
        };
        true
    }

    /// Revert an outstanding load back to `Missing`
    pub fn abandon(&self, ticket: u64) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if matches!(*state, TileState::Loading(current) if current == ticket) {
            *state = TileState::Missing;
            return true;
        }
        false
    }

    /// Forget a failure so the tile is fetched again
    pub fn clear_error(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if matches!(*state, TileState::Error(_)) {
            *state = TileState::Missing;
            return true;
        }
        false
    }
}

/// Cache statistics, reported by the debug overlay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub loaded: usize,
    pub loading: usize,
    pub errors: usize,
    pub overzoomed: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded LRU index of tiles for one source.
///
/// The index lock is only held for lookups and insertions; entries that are
/// loading are skipped by eviction, so the cache can exceed its capacity
/// while many fetches are in flight.
#[derive(Debug)]
pub struct TileCache {
    source: String,
    capacity: usize,
    index: Mutex<LruCache<TilePosition, Arc<CachedTile>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    pub fn new(source: impl Into<String>, capacity: usize) -> Self {
        Self {
            source: source.into(),
            capacity: capacity.max(1),
            index: Mutex::new(LruCache::unbounded()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self, position: TilePosition) -> TileKey {
        TileKey::new(self.source.clone(), position)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.lock().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry and mark it recently used
    pub fn get(&self, position: &TilePosition) -> Option<Arc<CachedTile>> {
        let mut found = None;
        if let Ok(mut index) = self.index.lock() {
            found = index.get(position).cloned();
        }
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Look up an entry without touching recency or statistics
    pub fn peek(&self, position: &TilePosition) -> Option<Arc<CachedTile>> {
        let mut found = None;
        if let Ok(index) = self.index.lock() {
            found = index.peek(position).cloned();
        }
        found
    }

    /// Return the entry for `position`, creating a `Missing` one if needed
    pub fn get_or_create(&self, position: TilePosition) -> Arc<CachedTile> {
        let Ok(mut index) = self.index.lock() else {
            return Arc::new(CachedTile::new(position));
        };

        if let Some(tile) = index.get(&position) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(tile);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let tile = Arc::new(CachedTile::new(position));
        index.put(position, Arc::clone(&tile));
        self.evict_overflow(&mut index, position);
        tile
    }

    fn evict_overflow(&self, index: &mut LruCache<TilePosition, Arc<CachedTile>>, keep: TilePosition) {
        while index.len() > self.capacity {
            let victim = index
                .iter()
                .rev()
                .find(|(position, tile)| **position != keep && !tile.is_loading())
                .map(|(position, _)| *position);

            match victim {
                Some(position) => {
                    index.pop(&position);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Snapshot of all entries, most recently used first
    pub fn entries(&self) -> Vec<Arc<CachedTile>> {
        let mut entries = Vec::new();
        if let Ok(index) = self.index.lock() {
            entries.extend(index.iter().map(|(_, tile)| Arc::clone(tile)));
        }
        entries
    }

    /// Drop every entry that is not loading; returns how many were removed
    pub fn clear(&self) -> usize {
        let Ok(mut index) = self.index.lock() else {
            return 0;
        };
        let idle: Vec<TilePosition> = index
            .iter()
            .filter(|(_, tile)| !tile.is_loading())
            .map(|(position, _)| *position)
            .collect();
        for position in &idle {
            index.pop(position);
        }
        idle.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            ..CacheStats::default()
        };

        for tile in self.entries() {
            stats.entries += 1;
            match tile.state() {
                TileState::Loaded(_) => stats.loaded += 1,
                TileState::Loading(_) => stats.loading += 1,
                TileState::Error(_) => stats.errors += 1,
                TileState::Overzoomed => stats.overzoomed += 1,
                TileState::Missing => {}
            }
        }
        stats
    }
}
