pub mod context;
pub mod converter;
pub mod filters;
pub mod raster;
pub mod transform;

// Re-export main types
pub use context::{colors, Color, DrawCommand, RectStyle, RenderContext, Surface, TextAnchor, TextStyle};
pub use converter::CoordinateConverter;
pub use filters::{
    BlurFilter, ColorfulnessFilter, FilteredImageCache, GammaFilter, ImageFilter, ImageFilterPipeline,
    SharpenFilter,
};
pub use raster::RasterSurface;
pub use transform::AffineTransform;
