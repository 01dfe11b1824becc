use crate::core::config::TileLayerConfig;
use crate::core::constants::{FALLBACK_ZOOM_OFFSETS, MAX_TILES_PER_FRAME};
use crate::core::events::{EventBus, SubscriptionId, TileEvent};
use crate::core::geo::Point;
use crate::core::viewport::Viewport;
use crate::layers::zoom::ZoomLevelManager;
use crate::prelude::{Arc, Duration, Instant};
use crate::rendering::context::{colors, RectStyle, Surface, TextAnchor, TextStyle};
use crate::rendering::converter::CoordinateConverter;
use crate::rendering::filters::{FilteredImageCache, ImageFilterPipeline};
use crate::tiles::cache::CacheStats;
use crate::tiles::job::TileLoader;
use crate::tiles::manager::{LoadOutcome, TileManager, TileSetInfo, TileStatus};
use crate::tiles::memory::MemoryManager;
use crate::tiles::position::{TilePosition, TileRange};
use crate::tiles::source::{TileSource, TileSourceConfig};
use crate::{MapError, Result};
use image::imageops;

/// User-facing notice drawn over the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    /// The view spans too many tiles to fetch
    ZoomInToLoad,
    /// Manual zoom shows fewer than two tiles across
    IncreaseZoomLevel,
    /// The source has no imagery at the current level
    NoTilesAtZoom,
    /// The cache memory could not be reserved
    NotEnoughMemory,
}

impl StatusMessage {
    pub fn text(&self) -> &'static str {
        match self {
            StatusMessage::ZoomInToLoad => "Zoom in to load more tiles",
            StatusMessage::IncreaseZoomLevel => "Increase zoom level to see more detail",
            StatusMessage::NoTilesAtZoom => "No tiles at this zoom level",
            StatusMessage::NotEnoughMemory => "Not enough memory to display tiles",
        }
    }
}

impl std::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// What a call to [`TileLayer::paint`] did
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Best zoom for the view, before clamping
    pub best_zoom: i32,
    /// Level tiles were requested for
    pub fetch_zoom: u8,
    /// Level that was painted
    pub display_zoom: u8,
    pub display_range: TileRange,
    /// Tiles drawn at the display level
    pub tiles_drawn: usize,
    /// Missing tiles covered from another level
    pub fallback_tiles: usize,
    pub load: Option<LoadOutcome>,
    pub info: TileSetInfo,
    pub status: Option<StatusMessage>,
    pub elapsed: Duration,
}

impl FrameReport {
    fn new(best_zoom: i32, zoom: u8) -> Self {
        Self {
            best_zoom,
            fetch_zoom: zoom,
            display_zoom: zoom,
            display_range: TileRange::empty(),
            tiles_drawn: 0,
            fallback_tiles: 0,
            load: None,
            info: TileSetInfo::default(),
            status: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// A tiled imagery layer: decides which level to fetch, keeps the cache
/// populated and composites whatever is available onto a [`Surface`].
pub struct TileLayer {
    /// Validated layer options
    config: TileLayerConfig,
    source: Arc<dyn TileSource>,
    /// Cache, loader glue and memory reservation
    manager: TileManager,
    zoom: ZoomLevelManager,
    filters: ImageFilterPipeline,
    /// Filtered copies of tile images, reused across frames
    filtered: FilteredImageCache,
    /// Budget shared with the tile cache; the filter memo reserves from it
    memory: MemoryManager,
    /// Tile highlighted with its state
    inspected: Option<TilePosition>,
    last_report: Option<FrameReport>,
    detached: bool,
}

impl TileLayer {
    /// Create a layer. The configured zoom bounds are narrowed to the ones
    /// the source declares.
    pub fn new(
        source: Arc<dyn TileSource>,
        loader: Arc<dyn TileLoader>,
        memory: MemoryManager,
        mut config: TileLayerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (min_zoom, max_zoom) = source_zoom_bounds(source.as_ref(), config.min_zoom, config.max_zoom);

        let bus = EventBus::new();
        let manager = TileManager::new(Arc::clone(&source), loader, memory.clone(), &config, bus.clone());
        let zoom = ZoomLevelManager::new(min_zoom, max_zoom, config.auto_zoom, bus)?;
        manager.allocate();
        let filtered = FilteredImageCache::new(manager.capacity().min(MAX_TILES_PER_FRAME), source.tile_size());

        log::info!(
            "tile layer '{}' zoom {}..={} cache {} tiles",
            source.name(),
            zoom.min_zoom(),
            zoom.max_zoom(),
            manager.capacity()
        );

        Ok(Self {
            config,
            source,
            manager,
            zoom,
            filters: ImageFilterPipeline::new(),
            filtered,
            memory,
            inspected: None,
            last_report: None,
            detached: false,
        })
    }

    /// Create a layer for a source described in configuration
    pub fn from_source_config(
        source: &TileSourceConfig,
        loader: Arc<dyn TileLoader>,
        memory: MemoryManager,
        config: TileLayerConfig,
    ) -> Result<Self> {
        Self::new(source.build()?, loader, memory, config)
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn attribution(&self) -> Option<String> {
        self.source.attribution()
    }

    pub fn config(&self) -> &TileLayerConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    pub fn manager(&self) -> &TileManager {
        &self.manager
    }

    pub fn zoom(&self) -> &ZoomLevelManager {
        &self.zoom
    }

    pub fn bus(&self) -> &EventBus {
        self.manager.bus()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TileEvent) + Send + Sync + 'static,
    {
        self.bus().subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus().unsubscribe(id)
    }

    /// Tiles changed since the last paint
    pub fn needs_repaint(&self) -> bool {
        self.manager.changes().is_pending()
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    pub fn filters(&self) -> &ImageFilterPipeline {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut ImageFilterPipeline {
        &mut self.filters
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.config.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn set_auto_zoom(&mut self, auto_zoom: bool) {
        self.config.auto_zoom = auto_zoom;
        self.zoom.set_auto_zoom(auto_zoom);
    }

    pub fn set_auto_load(&mut self, auto_load: bool) {
        self.config.auto_load = auto_load;
    }

    pub fn set_show_errors(&mut self, show_errors: bool) {
        self.config.show_errors = show_errors;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    /// Change the fetch level; outstanding jobs for the old level are
    /// cancelled
    pub fn set_zoom_level(&mut self, zoom: u8) -> bool {
        let accepted = self.zoom.set_zoom_level(zoom);
        self.after_zoom_change(accepted)
    }

    pub fn increase_zoom_level(&mut self) -> bool {
        let changed = self.zoom.increase_zoom_level();
        self.after_zoom_change(changed)
    }

    pub fn decrease_zoom_level(&mut self) -> bool {
        let changed = self.zoom.decrease_zoom_level();
        self.after_zoom_change(changed)
    }

    /// Replace the zoom bounds; like at construction they are narrowed to
    /// the range the source declares
    pub fn set_zoom_bounds(&mut self, min_zoom: u8, max_zoom: u8) -> Result<()> {
        if min_zoom > max_zoom {
            return Err(MapError::InvalidZoomBounds {
                min: min_zoom,
                max: max_zoom,
            });
        }
        let (min_zoom, max_zoom) = source_zoom_bounds(self.source.as_ref(), min_zoom, max_zoom);
        let before = self.zoom.current_zoom();
        self.zoom.set_zoom_bounds(min_zoom, max_zoom)?;
        if self.zoom.current_zoom() != before {
            self.manager.cancel_outstanding();
        }
        Ok(())
    }

    fn after_zoom_change(&mut self, changed: bool) -> bool {
        if changed && self.manager.outstanding_count() > 0 {
            self.manager.cancel_outstanding();
        }
        changed
    }

    /// Fetch every tile of the view at the current level, bypassing caches
    /// below the loader when `force` is set
    pub fn load_all_tiles(&self, viewport: &Viewport, force: bool) -> LoadOutcome {
        let range = self.converter(viewport).tile_range_for_view(self.zoom.current_zoom());
        self.manager.ensure_loaded(&range, force)
    }

    pub fn load_tile(&self, position: TilePosition, force: bool) -> bool {
        self.manager.load_tile(position, force)
    }

    pub fn reload_errors(&self) -> usize {
        self.manager.reload_errors()
    }

    pub fn clear_cache(&self) -> usize {
        self.filtered.clear();
        self.manager.clear_cache()
    }

    pub fn stats(&self) -> CacheStats {
        self.manager.stats()
    }

    /// Highlight the display-level tile under a screen point; returns it
    pub fn inspect_tile_at(&mut self, viewport: &Viewport, point: &Point) -> Option<TilePosition> {
        let position = self
            .converter(viewport)
            .screen_to_tile(point, self.zoom.display_zoom())
            .position();
        self.inspected = position.is_valid().then_some(position);
        self.inspected
    }

    pub fn inspect_tile(&mut self, position: Option<TilePosition>) {
        self.inspected = position;
    }

    pub fn inspected_tile(&self) -> Option<TilePosition> {
        self.inspected
    }

    /// Release the layer's jobs and memory. Idempotent; also run on drop.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.manager.cancel_outstanding();
        self.manager.free();
        self.filtered.release();
        log::debug!("tile layer '{}' detached", self.source.name());
        self.bus().publish(TileEvent::Detached);
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    fn converter(&self, viewport: &Viewport) -> CoordinateConverter {
        CoordinateConverter::new(
            viewport,
            Arc::clone(&self.source),
            self.config.displacement,
            self.config.zoom_offset,
        )
    }

    fn info_at(&self, converter: &CoordinateConverter, zoom: u8) -> TileSetInfo {
        self.manager.tile_set_info(&converter.tile_range_for_view(zoom))
    }

    /// Draw one frame of the layer
    pub fn paint(&mut self, viewport: &Viewport, surface: &mut dyn Surface) -> FrameReport {
        let started = Instant::now();
        self.manager.changes().acknowledge();

        let converter = self.converter(viewport);
        let best_zoom = converter.best_zoom();
        let mut report = FrameReport::new(best_zoom, self.zoom.current_zoom());

        if self.detached {
            return report;
        }
        if !self.manager.has_memory() {
            report.status = Some(StatusMessage::NotEnoughMemory);
            draw_status(surface, StatusMessage::NotEnoughMemory);
            report.elapsed = started.elapsed();
            self.last_report = Some(report.clone());
            return report;
        }

        if self.zoom.update_zoom_level(&converter) {
            self.manager.cancel_outstanding();
        }

        let (fetch_zoom, no_tiles) = self.choose_fetch_zoom(&converter);
        let fetch_range = converter.tile_range_for_view(fetch_zoom);
        let too_large = self.manager.is_too_large(&fetch_range);
        if self.config.auto_load {
            report.load = Some(self.manager.ensure_loaded(&fetch_range, false));
        }

        let display_zoom = self.zoom.display_zoom();
        let display_range = if display_zoom == fetch_zoom {
            fetch_range
        } else {
            converter.tile_range_for_view(display_zoom)
        };

        if self.filters.is_empty() {
            self.filtered.release();
        } else {
            self.filtered.reserve(&self.memory);
        }
        let missed = self.draw_tiles(&converter, &display_range, surface, &mut report);
        if self.config.auto_zoom {
            report.fallback_tiles = self.fill_missed(&converter, missed, display_zoom, surface);
        }
        if self.config.show_errors {
            self.draw_errors(&converter, &display_range, surface);
        }
        if let Some(position) = self.inspected {
            self.draw_inspected(&converter, position, surface);
        }

        report.fetch_zoom = fetch_zoom;
        report.display_zoom = display_zoom;
        report.display_range = display_range;
        report.info = self.manager.tile_set_info(&display_range);
        report.status = if too_large {
            Some(StatusMessage::ZoomInToLoad)
        } else if !self.config.auto_zoom && !fetch_range.is_empty() && fetch_range.tiles_spanned() < 2.0 {
            Some(StatusMessage::IncreaseZoomLevel)
        } else if no_tiles {
            Some(StatusMessage::NoTilesAtZoom)
        } else {
            None
        };
        if let Some(status) = report.status {
            draw_status(surface, status);
        }

        report.elapsed = started.elapsed();
        if self.config.debug {
            self.draw_debug(&converter, &report, surface);
        }

        #[cfg(feature = "debug")]
        log::trace!(
            "frame z{} (display z{}, best {}): {} drawn, {} fallback in {:?}",
            fetch_zoom,
            display_zoom,
            best_zoom,
            report.tiles_drawn,
            report.fallback_tiles,
            report.elapsed
        );

        self.last_report = Some(report.clone());
        report
    }

    /// Settle the level to fetch this frame, and whether nothing at all can
    /// be shown. The search always starts from the current level, which
    /// follows the view; its result never moves the current level.
    fn choose_fetch_zoom(&mut self, converter: &CoordinateConverter) -> (u8, bool) {
        let mut zoom = self.zoom.current_zoom();
        let mut info = self.info_at(converter, zoom);

        if !(self.config.auto_zoom && self.config.auto_load) {
            return (zoom, false);
        }
        let overzoomed_here = !info.has_visible() && !info.has_loading() && info.has_overzoomed();
        let (min, max) = (self.zoom.min_zoom(), self.zoom.max_zoom());

        // Highest level at or below the current one with something visible
        let mut display = None;
        for candidate in (min + 1..=zoom).rev() {
            if self.info_at(converter, candidate).has_visible() {
                display = Some(candidate);
                break;
            }
        }
        let no_tiles = overzoomed_here && display.is_none();
        let display = display.unwrap_or_else(|| self.zoom.display_zoom().min(zoom));

        // Overzoomed with nothing visible: bisect towards the display level
        while zoom > display && !info.has_visible() && info.has_overzoomed() {
            zoom = ((zoom as u16 + display as u16) / 2) as u8;
            info = self.info_at(converter, zoom);
        }
        self.zoom.set_display_zoom_level(display);

        // Everything here is settled; try one level up
        if zoom == display && info.has_all_loaded() && zoom < max {
            zoom += 1;
            info = self.info_at(converter, zoom);
        }

        // Step down until the overzoomed tiles are covered by real ones
        while zoom > min && info.has_overzoomed() && !info.has_loading() {
            zoom -= 1;
            info = self.info_at(converter, zoom);
        }

        (zoom, no_tiles)
    }

    /// Draw loaded tiles of `range`, centre first; returns the positions
    /// that had nothing to draw
    fn draw_tiles(
        &self,
        converter: &CoordinateConverter,
        range: &TileRange,
        surface: &mut dyn Surface,
        report: &mut FrameReport,
    ) -> Vec<TilePosition> {
        let limit = self.manager.capacity().min(MAX_TILES_PER_FRAME);
        let mut missed = Vec::new();

        for position in range.tile_positions_sorted().into_iter().take(limit) {
            let image = self.manager.get(&position).and_then(|tile| tile.image());
            match image {
                Some(image) => {
                    let image = self.filtered.get_or_apply(position, &image, &self.filters);
                    surface.draw_image(&image, &converter.pixel_transform(&position), self.config.opacity);
                    report.tiles_drawn += 1;
                }
                None => missed.push(position),
            }
        }
        missed
    }

    /// Cover missed tiles from neighbouring levels; returns how many were
    /// covered
    fn fill_missed(
        &self,
        converter: &CoordinateConverter,
        mut missed: Vec<TilePosition>,
        display_zoom: u8,
        surface: &mut dyn Surface,
    ) -> usize {
        let total = missed.len();
        for offset in FALLBACK_ZOOM_OFFSETS {
            if missed.is_empty() {
                break;
            }
            let zoom = display_zoom as i32 + offset;
            if zoom < self.zoom.min_zoom() as i32 || zoom > self.zoom.max_zoom() as i32 {
                continue;
            }
            missed.retain(|position| !self.draw_substitute(converter, position, zoom as u8, surface));
        }
        total - missed.len()
    }

    fn draw_substitute(
        &self,
        converter: &CoordinateConverter,
        position: &TilePosition,
        zoom: u8,
        surface: &mut dyn Surface,
    ) -> bool {
        let cache = self.manager.cache();
        let opacity = self.config.opacity;

        if zoom > position.zoom {
            // A finer level never stands in for a tile the source lacks
            if cache.peek(position).is_some_and(|tile| tile.is_overzoomed()) {
                return false;
            }
            let children: Option<Vec<_>> = position
                .to_range()
                .at_zoom(zoom)
                .tile_positions()
                .into_iter()
                .map(|child| cache.peek(&child).and_then(|tile| tile.image()).map(|image| (child, image)))
                .collect();
            let Some(children) = children else {
                return false;
            };
            for (child, image) in children {
                let image = self.filtered.get_or_apply(child, &image, &self.filters);
                surface.draw_image(&image, &converter.pixel_transform(&child), opacity);
            }
            return true;
        }

        let Some(ancestor) = position.ancestor_at(zoom) else {
            return false;
        };
        let Some(image) = cache.peek(&ancestor).and_then(|tile| tile.image()) else {
            return false;
        };
        let image = self.filtered.get_or_apply(ancestor, &image, &self.filters);

        let shift = (position.zoom - zoom) as u32;
        let (width, height) = image.dimensions();
        let (part_w, part_h) = (width >> shift, height >> shift);
        if part_w == 0 || part_h == 0 {
            return false;
        }
        let mask = (1u32 << shift) - 1;
        let part = imageops::crop_imm(
            image.as_ref(),
            (position.x & mask) * part_w,
            (position.y & mask) * part_h,
            part_w,
            part_h,
        )
        .to_image();
        surface.draw_image(&Arc::new(part), &converter.pixel_transform(position), opacity);
        true
    }

    fn draw_errors(&self, converter: &CoordinateConverter, range: &TileRange, surface: &mut dyn Surface) {
        let style = TextStyle {
            color: colors::RED,
            anchor: TextAnchor::Center,
            ..TextStyle::default()
        };
        for tile in self.manager.cache().entries() {
            if !range.contains(&tile.position()) {
                continue;
            }
            if let Some(message) = tile.error_message() {
                let rect = converter.tile_screen_rect(&tile.position());
                surface.draw_text(rect.center(), &format!("Error: {}", message), style);
            }
        }
    }

    fn draw_inspected(&self, converter: &CoordinateConverter, position: TilePosition, surface: &mut dyn Surface) {
        let rect = converter.tile_screen_rect(&position);
        surface.draw_rect(rect, RectStyle::outline(colors::YELLOW, 2.0));

        let status = match self.manager.status_at(&position) {
            TileStatus::Visible => "loaded".to_string(),
            TileStatus::Missing => "missing".to_string(),
            TileStatus::Loading => "loading".to_string(),
            TileStatus::Overzoomed => "no tile".to_string(),
            TileStatus::Failed => "error".to_string(),
        };
        surface.draw_text(
            rect.center(),
            &format!("{} {}", position, status),
            TextStyle {
                color: colors::YELLOW,
                anchor: TextAnchor::Center,
                ..TextStyle::default()
            },
        );
    }

    fn draw_debug(&self, converter: &CoordinateConverter, report: &FrameReport, surface: &mut dyn Surface) {
        let stats = self.manager.stats();
        let lines = [
            format!(
                "zoom {} display {} best {}",
                report.fetch_zoom, report.display_zoom, report.best_zoom
            ),
            format!("scale factor {:.3}", converter.scale_factor(report.display_zoom)),
            format!("tiles {} ({} fallback) range {}", report.tiles_drawn, report.fallback_tiles, report.display_range),
            format!(
                "cache {}/{} loaded {} loading {} errors {}",
                stats.entries, stats.capacity, stats.loaded, stats.loading, stats.errors
            ),
            format!("frame {:.1} ms", report.elapsed.as_secs_f64() * 1000.0),
        ];

        let style = TextStyle::default();
        let mut y = 8.0;
        for line in &lines {
            surface.draw_text(Point::new(8.0, y), line, style);
            y += style.estimate_size(line).1 + 2.0;
        }
    }
}

fn draw_status(surface: &mut dyn Surface, status: StatusMessage) {
    let (width, height) = surface.size();
    surface.draw_text(
        Point::new(width as f64 / 2.0, height as f64 - 12.0),
        status.text(),
        TextStyle {
            anchor: TextAnchor::BottomCenter,
            size: 14.0,
            ..TextStyle::default()
        },
    );
}

impl Drop for TileLayer {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Intersection of the requested bounds with the source's zoom range
fn source_zoom_bounds(source: &dyn TileSource, min_zoom: u8, max_zoom: u8) -> (u8, u8) {
    let max = max_zoom.min(source.max_zoom());
    (min_zoom.max(source.min_zoom()).min(max), max)
}

impl std::fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLayer")
            .field("source", &self.source.name())
            .field("zoom", &self.zoom)
            .field("filters", &self.filters)
            .field("detached", &self.detached)
            .finish()
    }
}
