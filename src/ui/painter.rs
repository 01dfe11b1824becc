//! [`Surface`] implementation drawing into an egui [`Painter`].

use crate::core::bounds::Bounds;
use crate::core::geo::Point;
use crate::prelude::{Arc, HashMap, HashSet};
use crate::rendering::context::{Color, RectStyle, Surface, TextAnchor, TextStyle};
use crate::rendering::transform::AffineTransform;
use egui::epaint::Vertex;
use egui::{Align2, Color32, ColorImage, FontId, Mesh, Painter, Pos2, Rect, Shape, Stroke, TextureHandle};
use image::RgbaImage;

/// GPU textures for tile images, keyed by image identity.
///
/// Each entry keeps its image alive so an address is never reused while the
/// texture is cached. Textures not drawn during a frame are released by
/// [`TextureCache::end_frame`].
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<usize, (Arc<RgbaImage>, TextureHandle)>,
    used: HashSet<usize>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn texture_for(&mut self, ctx: &egui::Context, image: &Arc<RgbaImage>) -> egui::TextureId {
        let key = Arc::as_ptr(image) as usize;
        self.used.insert(key);
        if let Some((_, handle)) = self.textures.get(&key) {
            return handle.id();
        }

        let size = [image.width() as usize, image.height() as usize];
        let color_image = ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        let handle = ctx.load_texture(format!("tile_{:x}", key), color_image, egui::TextureOptions::default());
        let id = handle.id();
        self.textures.insert(key, (Arc::clone(image), handle));
        id
    }

    /// Drop textures that were not used since the previous call
    pub fn end_frame(&mut self) {
        let used = std::mem::take(&mut self.used);
        self.textures.retain(|key, _| used.contains(key));
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.used.clear();
    }
}

fn color32(color: Color) -> Color32 {
    let [r, g, b, a] = color.0;
    Color32::from_rgba_unmultiplied(r, g, b, a)
}

/// Paints tiles and overlays into a screen rectangle of an egui painter
pub struct EguiSurface<'a> {
    painter: &'a Painter,
    textures: &'a mut TextureCache,
    rect: Rect,
}

impl<'a> EguiSurface<'a> {
    pub fn new(painter: &'a Painter, textures: &'a mut TextureCache, rect: Rect) -> Self {
        Self {
            painter,
            textures,
            rect,
        }
    }

    fn to_screen(&self, point: &Point) -> Pos2 {
        Pos2::new(self.rect.min.x + point.x as f32, self.rect.min.y + point.y as f32)
    }

    fn to_rect(&self, bounds: &Bounds) -> Rect {
        Rect::from_two_pos(self.to_screen(&bounds.min), self.to_screen(&bounds.max))
    }
}

impl Surface for EguiSurface<'_> {
    fn size(&self) -> (u32, u32) {
        (self.rect.width().max(0.0) as u32, self.rect.height().max(0.0) as u32)
    }

    fn draw_image(&mut self, image: &Arc<RgbaImage>, transform: &AffineTransform, opacity: f32) {
        if image.width() == 0 || image.height() == 0 || opacity <= 0.0 {
            return;
        }
        let texture = self.textures.texture_for(self.painter.ctx(), image);
        let tint = Color32::WHITE.gamma_multiply(opacity.min(1.0));

        // The transform may rotate or shear, so the tile goes out as a quad
        let mut mesh = Mesh::with_texture(texture);
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let corner = transform.apply(&Point::new(u, v));
            mesh.vertices.push(Vertex {
                pos: self.to_screen(&corner),
                uv: Pos2::new(u as f32, v as f32),
                color: tint,
            });
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(0, 2, 3);
        self.painter.add(Shape::mesh(mesh));
    }

    fn draw_rect(&mut self, rect: Bounds, style: RectStyle) {
        let rect = self.to_rect(&rect);
        if let Some(fill) = style.fill {
            self.painter.rect_filled(rect, 0.0, color32(fill));
        }
        if let Some((color, width)) = style.stroke {
            self.painter.rect_stroke(rect, 0.0, Stroke::new(width, color32(color)));
        }
    }

    fn draw_text(&mut self, position: Point, text: &str, style: TextStyle) {
        if let Some(background) = style.background {
            let text_box = self.to_rect(&style.text_box(position, text));
            self.painter.rect_filled(text_box.expand(2.0), 2.0, color32(background));
        }
        let anchor = match style.anchor {
            TextAnchor::TopLeft => Align2::LEFT_TOP,
            TextAnchor::Center => Align2::CENTER_CENTER,
            TextAnchor::BottomCenter => Align2::CENTER_BOTTOM,
        };
        self.painter.text(
            self.to_screen(&position),
            anchor,
            text,
            FontId::proportional(style.size),
            color32(style.color),
        );
    }
}
