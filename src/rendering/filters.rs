//! Image filters applied to decoded tiles before compositing.

use crate::prelude::{Arc, Mutex};
use crate::tiles::memory::{MemoryHandle, MemoryManager};
use crate::tiles::position::TilePosition;
use image::{imageops, Rgba, RgbaImage};
use lru::LruCache;
use std::num::NonZeroUsize;

/// A pure image transform. Implementations must not depend on how often
/// they are called and never modify their input.
pub trait ImageFilter: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, image: &RgbaImage) -> RgbaImage;
}

/// Gamma correction through a lookup table
#[derive(Debug, Clone)]
pub struct GammaFilter {
    gamma: f32,
    table: [u8; 256],
}

impl GammaFilter {
    pub fn new(gamma: f32) -> Self {
        let gamma = if gamma > 0.0 && gamma.is_finite() { gamma } else { 1.0 };
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let value = (i as f32 / 255.0).powf(1.0 / gamma) * 255.0;
            *entry = value.round().clamp(0.0, 255.0) as u8;
        }
        Self { gamma, table }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }
}

impl ImageFilter for GammaFilter {
    fn name(&self) -> &str {
        "gamma"
    }

    fn process(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for channel in pixel.0.iter_mut().take(3) {
                *channel = self.table[*channel as usize];
            }
        }
        out
    }
}

/// Unsharp mask
#[derive(Debug, Clone)]
pub struct SharpenFilter {
    pub sigma: f32,
    pub threshold: i32,
}

impl SharpenFilter {
    pub fn new(sigma: f32, threshold: i32) -> Self {
        Self { sigma, threshold }
    }
}

impl ImageFilter for SharpenFilter {
    fn name(&self) -> &str {
        "sharpen"
    }

    fn process(&self, image: &RgbaImage) -> RgbaImage {
        imageops::unsharpen(image, self.sigma, self.threshold)
    }
}

/// Gaussian blur
#[derive(Debug, Clone)]
pub struct BlurFilter {
    pub sigma: f32,
}

impl BlurFilter {
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl ImageFilter for BlurFilter {
    fn name(&self) -> &str {
        "blur"
    }

    fn process(&self, image: &RgbaImage) -> RgbaImage {
        if self.sigma <= 0.0 {
            return image.clone();
        }
        imageops::blur(image, self.sigma)
    }
}

/// Scales saturation around the pixel's luma: 0 is greyscale, 1 unchanged
#[derive(Debug, Clone)]
pub struct ColorfulnessFilter {
    pub factor: f32,
}

impl ColorfulnessFilter {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.max(0.0),
        }
    }
}

impl ImageFilter for ColorfulnessFilter {
    fn name(&self) -> &str {
        "colorfulness"
    }

    fn process(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        for Rgba([r, g, b, _]) in out.pixels_mut() {
            let luma = 0.299 * *r as f32 + 0.587 * *g as f32 + 0.114 * *b as f32;
            for channel in [r, g, b] {
                let value = luma + (*channel as f32 - luma) * self.factor;
                *channel = value.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

/// Ordered list of filters. Every change bumps the generation so cached
/// results can be recognised as stale.
#[derive(Clone, Default)]
pub struct ImageFilterPipeline {
    filters: Vec<Arc<dyn ImageFilter>>,
    generation: u64,
}

impl ImageFilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl ImageFilter + 'static) {
        self.filters.push(Arc::new(filter));
        self.generation += 1;
    }

    /// Remove every filter with this name; returns how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.name() != name);
        let removed = before - self.filters.len();
        if removed > 0 {
            self.generation += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.filters.is_empty() {
            self.filters.clear();
            self.generation += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    /// Run every filter in order; the input is returned untouched when the
    /// pipeline is empty
    pub fn apply(&self, image: &Arc<RgbaImage>) -> Arc<RgbaImage> {
        let Some((first, rest)) = self.filters.split_first() else {
            return Arc::clone(image);
        };
        let mut current = first.process(image);
        for filter in rest {
            current = filter.process(&current);
        }
        Arc::new(current)
    }
}

impl std::fmt::Debug for ImageFilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFilterPipeline")
            .field("filters", &self.names())
            .field("generation", &self.generation)
            .finish()
    }
}

struct FilteredEntry {
    generation: u64,
    source: Arc<RgbaImage>,
    filtered: Arc<RgbaImage>,
}

/// Memo of filtered tile images so unchanged tiles are not re-filtered every
/// frame.
///
/// The memo only keeps results while it holds a reservation of
/// `4 * tile_size² * capacity` bytes from the shared budget; without one,
/// filters run on every draw and nothing is retained.
pub struct FilteredImageCache {
    entries: Mutex<LruCache<TilePosition, FilteredEntry>>,
    bytes: usize,
    reservation: Mutex<Option<MemoryHandle>>,
}

impl FilteredImageCache {
    pub fn new(capacity: usize, tile_size: u32) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let ts = tile_size as usize;
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            bytes: 4 * ts * ts * capacity.get(),
            reservation: Mutex::new(None),
        }
    }

    /// Bytes the memo reserves while active
    pub fn reserved_bytes(&self) -> usize {
        self.bytes
    }

    /// Reserve the memo's budget unless already held; returns whether the
    /// memo is active
    pub fn reserve(&self, memory: &MemoryManager) -> bool {
        let Ok(mut reservation) = self.reservation.lock() else {
            return false;
        };
        if reservation.is_none() {
            match memory.allocate("filtered tiles", self.bytes) {
                Ok(handle) => *reservation = Some(handle),
                Err(err) => log::warn!("filtering tiles without a memo: {}", err),
            }
        }
        reservation.is_some()
    }

    /// Drop every memoised image and give the budget back
    pub fn release(&self) {
        self.clear();
        if let Ok(mut reservation) = self.reservation.lock() {
            *reservation = None;
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.reservation.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Filtered version of `image`, computed at most once per source image
    /// and pipeline generation while the memo is reserved
    pub fn get_or_apply(
        &self,
        position: TilePosition,
        image: &Arc<RgbaImage>,
        pipeline: &ImageFilterPipeline,
    ) -> Arc<RgbaImage> {
        if pipeline.is_empty() {
            return Arc::clone(image);
        }
        if !self.is_reserved() {
            return pipeline.apply(image);
        }

        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get(&position) {
                if entry.generation == pipeline.generation() && Arc::ptr_eq(&entry.source, image) {
                    return Arc::clone(&entry.filtered);
                }
            }
        }

        let filtered = pipeline.apply(image);
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                position,
                FilteredEntry {
                    generation: pipeline.generation(),
                    source: Arc::clone(image),
                    filtered: Arc::clone(&filtered),
                },
            );
        }
        filtered
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
