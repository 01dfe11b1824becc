use crate::core::bounds::Bounds;
use crate::core::geo::Point;
use crate::prelude::Arc;
use crate::rendering::transform::AffineTransform;
use image::{Rgba, RgbaImage};

/// Straight (non-premultiplied) RGBA colour
pub type Color = Rgba<u8>;

pub mod colors {
    use super::Color;
    use image::Rgba;

    pub const WHITE: Color = Rgba([255, 255, 255, 255]);
    pub const BLACK: Color = Rgba([0, 0, 0, 255]);
    pub const RED: Color = Rgba([220, 30, 30, 255]);
    pub const YELLOW: Color = Rgba([255, 210, 0, 255]);
    pub const SHADOW: Color = Rgba([0, 0, 0, 160]);
}

/// Outline and fill of a rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectStyle {
    pub fill: Option<Color>,
    pub stroke: Option<(Color, f32)>,
}

impl RectStyle {
    pub fn outline(color: Color, width: f32) -> Self {
        Self {
            fill: None,
            stroke: Some((color, width)),
        }
    }

    pub fn filled(color: Color) -> Self {
        Self {
            fill: Some(color),
            stroke: None,
        }
    }
}

/// Which point of the text box sits on the given position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    TopLeft,
    Center,
    BottomCenter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: Color,
    pub background: Option<Color>,
    pub size: f32,
    pub anchor: TextAnchor,
}

impl TextStyle {
    /// Rough extent of `text` in pixels, for surfaces without font metrics
    pub fn estimate_size(&self, text: &str) -> (f64, f64) {
        let width = text.chars().count() as f64 * self.size as f64 * 0.6;
        (width, self.size as f64 * 1.2)
    }

    /// Box occupied by `text` anchored at `position`
    pub fn text_box(&self, position: Point, text: &str) -> Bounds {
        let (w, h) = self.estimate_size(text);
        let min = match self.anchor {
            TextAnchor::TopLeft => position,
            TextAnchor::Center => Point::new(position.x - w / 2.0, position.y - h / 2.0),
            TextAnchor::BottomCenter => Point::new(position.x - w / 2.0, position.y - h),
        };
        Bounds::new(min, Point::new(min.x + w, min.y + h))
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: colors::WHITE,
            background: Some(colors::SHADOW),
            size: 12.0,
            anchor: TextAnchor::TopLeft,
        }
    }
}

/// Output target of the tile compositor
pub trait Surface {
    /// Size in pixels
    fn size(&self) -> (u32, u32);

    /// Draw `image` so that its unit square `[0, 1]²` lands where
    /// `transform` puts it
    fn draw_image(&mut self, image: &Arc<RgbaImage>, transform: &AffineTransform, opacity: f32);

    fn draw_rect(&mut self, rect: Bounds, style: RectStyle);

    fn draw_text(&mut self, position: Point, text: &str, style: TextStyle);
}

/// Commands recorded by a [`RenderContext`]
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Image {
        image: Arc<RgbaImage>,
        transform: AffineTransform,
        opacity: f32,
    },
    Rect {
        bounds: Bounds,
        style: RectStyle,
    },
    Text {
        position: Point,
        text: String,
        style: TextStyle,
    },
}

/// Surface that records draw commands instead of rasterising them
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub width: u32,
    pub height: u32,
    /// Drawing primitives queue
    pub drawing_queue: Vec<DrawCommand>,
    /// Viewport clipping bounds in screen coordinates
    pub clip_bounds: Option<Bounds>,
}

impl RenderContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            drawing_queue: Vec::new(),
            clip_bounds: None,
        }
    }

    /// Begin a frame
    pub fn begin_frame(&mut self) {
        self.drawing_queue.clear();
    }

    /// Get the current drawing queue
    pub fn get_drawing_queue(&self) -> &[DrawCommand] {
        &self.drawing_queue
    }

    /// Drop commands that fall completely outside these bounds
    pub fn set_clip_bounds(&mut self, bounds: Bounds) {
        self.clip_bounds = Some(bounds);
    }

    pub fn clear_clip_bounds(&mut self) {
        self.clip_bounds = None;
    }

    pub fn image_count(&self) -> usize {
        self.drawing_queue
            .iter()
            .filter(|command| matches!(command, DrawCommand::Image { .. }))
            .count()
    }

    pub fn rect_count(&self) -> usize {
        self.drawing_queue
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect { .. }))
            .count()
    }

    /// Text of every recorded label, in drawing order
    pub fn texts(&self) -> Vec<&str> {
        self.drawing_queue
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn visible(&self, bounds: &Bounds) -> bool {
        match &self.clip_bounds {
            Some(clip) => clip.intersects(bounds),
            None => true,
        }
    }

    /// Clear the drawing queue
    pub fn clear_queue(&mut self) {
        self.drawing_queue.clear();
    }
}

impl Surface for RenderContext {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw_image(&mut self, image: &Arc<RgbaImage>, transform: &AffineTransform, opacity: f32) {
        let corners = [
            transform.apply(&Point::new(0.0, 0.0)),
            transform.apply(&Point::new(1.0, 0.0)),
            transform.apply(&Point::new(0.0, 1.0)),
            transform.apply(&Point::new(1.0, 1.0)),
        ];
        if !self.visible(&Bounds::from_points(&corners)) {
            return;
        }
        self.drawing_queue.push(DrawCommand::Image {
            image: Arc::clone(image),
            transform: *transform,
            opacity: opacity.clamp(0.0, 1.0),
        });
    }

    fn draw_rect(&mut self, rect: Bounds, style: RectStyle) {
        if !self.visible(&rect) {
            return;
        }
        self.drawing_queue.push(DrawCommand::Rect { bounds: rect, style });
    }

    fn draw_text(&mut self, position: Point, text: &str, style: TextStyle) {
        self.drawing_queue.push(DrawCommand::Text {
            position,
            text: text.to_string(),
            style,
        });
    }
}
