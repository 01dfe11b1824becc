use crate::core::constants::MIN_DISPLAY_ZOOM;
use crate::core::events::{EventBus, TileEvent};
use crate::rendering::converter::CoordinateConverter;
use crate::{MapError, Result};

/// Current and display zoom of a tile layer, kept inside `[min, max]`.
///
/// The current level is what tiles are fetched for; the display level is
/// what gets painted and may lag behind while tiles load.
#[derive(Debug)]
pub struct ZoomLevelManager {
    current: u8,
    display: u8,
    min: u8,
    max: u8,
    auto_zoom: bool,
    bus: EventBus,
}

impl ZoomLevelManager {
    /// Starts at `min`. Fails when `min > max`.
    pub fn new(min: u8, max: u8, auto_zoom: bool, bus: EventBus) -> Result<Self> {
        let (min, max) = Self::check_bounds(min, max)?;
        Ok(Self {
            current: min,
            display: min,
            min,
            max,
            auto_zoom,
            bus,
        })
    }

    fn check_bounds(min: u8, max: u8) -> Result<(u8, u8)> {
        if min > max {
            return Err(MapError::InvalidZoomBounds { min, max });
        }
        if max < MIN_DISPLAY_ZOOM {
            return Err(MapError::Config(format!("max zoom must be at least {}", MIN_DISPLAY_ZOOM)));
        }
        Ok((min.max(MIN_DISPLAY_ZOOM), max))
    }

    pub fn current_zoom(&self) -> u8 {
        self.current
    }

    pub fn display_zoom(&self) -> u8 {
        self.display
    }

    pub fn min_zoom(&self) -> u8 {
        self.min
    }

    pub fn max_zoom(&self) -> u8 {
        self.max
    }

    pub fn is_auto_zoom(&self) -> bool {
        self.auto_zoom
    }

    pub fn set_auto_zoom(&mut self, auto_zoom: bool) {
        self.auto_zoom = auto_zoom;
    }

    /// Switch the fetch (and display) level. Returns false, leaving the
    /// state untouched, when `zoom` is out of bounds.
    pub fn set_zoom_level(&mut self, zoom: u8) -> bool {
        if zoom == self.current {
            return true;
        }
        if zoom < self.min || zoom > self.max {
            log::debug!(
                "rejecting zoom {} outside [{}, {}]",
                zoom,
                self.min,
                self.max
            );
            return false;
        }

        let from = self.current;
        self.current = zoom;
        self.display = zoom;
        log::debug!("zoom level {} -> {}", from, zoom);
        self.bus.publish(TileEvent::ZoomChanged { from, to: zoom });
        true
    }

    /// Set only the level being painted, clamped to the bounds
    pub fn set_display_zoom_level(&mut self, zoom: u8) {
        self.display = zoom.clamp(self.min, self.max);
    }

    pub fn zoom_increase_allowed(&self) -> bool {
        self.current < self.max
    }

    pub fn zoom_decrease_allowed(&self) -> bool {
        self.current > self.min
    }

    pub fn increase_zoom_level(&mut self) -> bool {
        self.zoom_increase_allowed() && self.set_zoom_level(self.current + 1)
    }

    pub fn decrease_zoom_level(&mut self) -> bool {
        self.zoom_decrease_allowed() && self.set_zoom_level(self.current - 1)
    }

    /// Follow the converter's best zoom when auto-zoom is on; returns
    /// whether the current level changed
    pub fn update_zoom_level(&mut self, converter: &CoordinateConverter) -> bool {
        if !self.auto_zoom {
            return false;
        }
        let before = self.current;
        let best = converter.best_zoom().clamp(self.min as i32, self.max as i32) as u8;
        self.set_zoom_level(best);
        self.current != before
    }

    /// Replace the zoom bounds, re-clamping the current and display levels
    pub fn set_zoom_bounds(&mut self, min: u8, max: u8) -> Result<()> {
        let (min, max) = Self::check_bounds(min, max)?;
        self.min = min;
        self.max = max;

        let clamped = self.current.clamp(min, max);
        if clamped != self.current {
            let from = self.current;
            self.current = clamped;
            self.bus.publish(TileEvent::ZoomChanged { from, to: clamped });
        }
        self.display = self.display.clamp(min, max);
        Ok(())
    }
}
