//! Tile layer configuration.
//!
//! Options are plain serde structs so they can be loaded from JSON alongside
//! the rest of an application's preferences.

use crate::core::constants::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, MIN_DISPLAY_ZOOM};
use crate::core::geo::EastNorth;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Screen dimensions used to size the tile cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayerConfig {
    /// Pick the zoom level from the viewport resolution
    pub auto_zoom: bool,
    /// Fetch visible tiles without an explicit user action
    pub auto_load: bool,
    /// Draw an error label over tiles that failed to load
    pub show_errors: bool,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Bias added to the best-zoom estimate (positive = sharper, more tiles)
    pub zoom_offset: i32,
    /// Registration offset in projected metres applied to every tile
    pub displacement: EastNorth,
    pub opacity: f32,
    /// Largest screen the layer is expected to fill
    pub screen_size: ScreenSize,
    /// Extra request headers handed to the tile loader
    pub headers: BTreeMap<String, String>,
    /// Draw zoom and cache diagnostics over the map
    pub debug: bool,
}

impl Default for TileLayerConfig {
    fn default() -> Self {
        Self {
            auto_zoom: true,
            auto_load: true,
            show_errors: true,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            zoom_offset: 0,
            displacement: EastNorth::default(),
            opacity: 1.0,
            screen_size: ScreenSize::default(),
            headers: BTreeMap::new(),
            debug: false,
        }
    }
}

impl TileLayerConfig {
    /// Manual zoom: the user picks the level, tiles are still fetched automatically
    pub fn manual_zoom() -> Self {
        Self {
            auto_zoom: false,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_zoom_bounds(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Reject impossible settings and normalise the rest.
    ///
    /// `min_zoom > max_zoom` is a configuration error. A `min_zoom` of 0 is
    /// raised to [`MIN_DISPLAY_ZOOM`] and opacity is clamped to `[0, 1]`.
    pub fn validate(&mut self) -> Result<()> {
        if self.min_zoom > self.max_zoom {
            return Err(MapError::InvalidZoomBounds {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if self.max_zoom < MIN_DISPLAY_ZOOM {
            return Err(MapError::Config(format!(
                "max_zoom must be at least {}",
                MIN_DISPLAY_ZOOM
            )));
        }
        if self.screen_size.width == 0 || self.screen_size.height == 0 {
            return Err(MapError::Config("screen_size must be non-zero".to_string()));
        }

        self.min_zoom = self.min_zoom.max(MIN_DISPLAY_ZOOM);
        self.opacity = self.opacity.clamp(0.0, 1.0);
        Ok(())
    }

    /// Request headers as name/value pairs, in name order
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
