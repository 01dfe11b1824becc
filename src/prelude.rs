//! Prelude module for common tilescope types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilescope::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{ScreenSize, TileLayerConfig},
    events::{EventBus, SubscriptionId, TileEvent},
    geo::{EastNorth, LatLng, LatLngBounds, Point},
    projection::Projection,
    viewport::Viewport,
};

pub use crate::layers::{FrameReport, StatusMessage, TileLayer, ZoomLevelManager};

pub use crate::tiles::{
    CachedTile, FnLoader, LoadOutcome, MemoryManager, TileCache, TileJob, TileLoadListener,
    TileLoader, TileManager, TileOutcome, TilePosition, TileRange, TileRequest, TileSource,
    TileSourceConfig, TileState, TmsSource, WmtsSource, BingSource,
};

#[cfg(feature = "tokio-runtime")]
pub use crate::tiles::{AsyncTileLoader, HttpFetcher, TileFetcher, TileLoaderConfig};

pub use crate::rendering::{
    AffineTransform, CoordinateConverter, ImageFilter, ImageFilterPipeline, RasterSurface,
    RenderContext, Surface,
};

pub use crate::runtime::{spawn, AsyncHandle, AsyncSpawner};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioSpawner;

#[cfg(feature = "egui")]
pub use crate::ui::EguiSurface;

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub use instant::Instant;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
