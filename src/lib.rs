//! # Tilescope
//!
//! A tile pyramid cache and display engine for pannable, zoomable raster
//! maps.
//!
//! A [`TileLayer`] picks the zoom level that matches the view, keeps a
//! bounded cache of tiles filled through a pluggable [`TileLoader`] and
//! composites whatever is available onto a [`Surface`], borrowing imagery
//! from neighbouring levels while tiles are still loading.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
#[cfg(feature = "egui")]
pub mod ui;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    config::{ScreenSize, TileLayerConfig},
    events::{EventBus, TileEvent},
    geo::{EastNorth, LatLng, LatLngBounds, Point},
    projection::Projection,
    viewport::Viewport,
};

pub use crate::layers::{FrameReport, StatusMessage, TileLayer, ZoomLevelManager};

pub use crate::rendering::{
    AffineTransform, CoordinateConverter, ImageFilterPipeline, RasterSurface, RenderContext, Surface,
};

pub use crate::tiles::{
    MemoryManager, TileCache, TileLoader, TileManager, TilePosition, TileRange, TileSource,
    TileSourceConfig,
};

#[cfg(feature = "tokio-runtime")]
pub use crate::tiles::{AsyncTileLoader, TileLoaderConfig};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid zoom bounds: min {min} > max {max}")]
    InvalidZoomBounds { min: u8, max: u8 },

    #[error("Not enough memory for '{tag}': {requested} bytes requested, {available} available")]
    NotEnoughMemory {
        tag: String,
        requested: usize,
        available: usize,
    },

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Route `log` output to stderr, filtered by `RUST_LOG`. Safe to call more
/// than once.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
