//! Tile addressing, sources, the tile cache and the loaders that fill it.

pub mod cache;
pub mod job;
#[cfg(feature = "tokio-runtime")]
pub mod loader;
pub mod manager;
pub mod memory;
pub mod position;
pub mod source;

pub use cache::{CacheStats, CachedTile, TileCache, TileState};
pub use job::{FnLoader, TileJob, TileLoadListener, TileLoader, TileOutcome, TileRequest};
#[cfg(feature = "tokio-runtime")]
pub use loader::{AsyncTileLoader, FetchResponse, HttpFetcher, TileFetcher, TileLoaderConfig};
pub use manager::{cache_capacity, LoadOutcome, TileManager, TileSetInfo, TileStatus};
pub use memory::{MemoryHandle, MemoryManager};
pub use position::{TileKey, TilePosition, TileRange, TileXY};
pub use source::{BingSource, TileSource, TileSourceConfig, TmsSource, WmtsSource};
