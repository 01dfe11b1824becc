pub mod tile;
pub mod zoom;

pub use tile::{FrameReport, StatusMessage, TileLayer};
pub use zoom::ZoomLevelManager;
