//! Software surface compositing tiles into an RGBA image.

use crate::core::bounds::Bounds;
use crate::core::geo::Point;
use crate::prelude::Arc;
use crate::rendering::context::{Color, RectStyle, Surface, TextStyle};
use crate::rendering::transform::AffineTransform;
use crate::Result;
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Surface backed by an [`RgbaImage`].
///
/// Images are resampled nearest-neighbour through the inverse transform.
/// Without font rasterisation, text is drawn as its background box and the
/// strings are kept in [`RasterSurface::labels`].
#[derive(Debug, Clone)]
pub struct RasterSurface {
    canvas: RgbaImage,
    labels: Vec<(Point, String)>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            canvas: RgbaImage::from_pixel(width, height, background),
            labels: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }

    pub fn labels(&self) -> &[(Point, String)] {
        &self.labels
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.canvas.save(path)?;
        Ok(())
    }

    fn clip(&self, bounds: &Bounds) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = self.canvas.dimensions();
        let min_x = bounds.min.x.floor().max(0.0);
        let min_y = bounds.min.y.floor().max(0.0);
        let max_x = bounds.max.x.ceil().min(w as f64);
        let max_y = bounds.max.y.ceil().min(h as f64);
        if !(min_x < max_x && min_y < max_y) {
            return None;
        }
        Some((min_x as u32, min_y as u32, max_x as u32, max_y as u32))
    }

    fn fill(&mut self, bounds: &Bounds, color: Color) {
        if let Some((x0, y0, x1, y1)) = self.clip(bounds) {
            for y in y0..y1 {
                for x in x0..x1 {
                    blend(self.canvas.get_pixel_mut(x, y), color, 1.0);
                }
            }
        }
    }
}

/// Source-over blend of a straight-alpha colour
fn blend(dst: &mut Rgba<u8>, src: Color, opacity: f32) {
    let alpha = src[3] as f32 / 255.0 * opacity;
    if alpha <= 0.0 {
        return;
    }
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    for i in 0..3 {
        let value = if out_alpha > 0.0 {
            (src[i] as f32 * alpha + dst[i] as f32 * dst_alpha * (1.0 - alpha)) / out_alpha
        } else {
            0.0
        };
        dst[i] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

impl Surface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn draw_image(&mut self, image: &Arc<RgbaImage>, transform: &AffineTransform, opacity: f32) {
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 || opacity <= 0.0 {
            return;
        }
        let Some(inverse) = transform.inverse() else {
            return;
        };

        let corners = [
            transform.apply(&Point::new(0.0, 0.0)),
            transform.apply(&Point::new(1.0, 0.0)),
            transform.apply(&Point::new(0.0, 1.0)),
            transform.apply(&Point::new(1.0, 1.0)),
        ];
        let Some((x0, y0, x1, y1)) = self.clip(&Bounds::from_points(&corners)) else {
            return;
        };

        let opacity = opacity.min(1.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let unit = inverse.apply(&Point::new(x as f64 + 0.5, y as f64 + 0.5));
                if !(0.0..1.0).contains(&unit.x) || !(0.0..1.0).contains(&unit.y) {
                    continue;
                }
                let sx = ((unit.x * iw as f64) as u32).min(iw - 1);
                let sy = ((unit.y * ih as f64) as u32).min(ih - 1);
                let src = *image.get_pixel(sx, sy);
                blend(self.canvas.get_pixel_mut(x, y), src, opacity);
            }
        }
    }

    fn draw_rect(&mut self, rect: Bounds, style: RectStyle) {
        if let Some(fill) = style.fill {
            self.fill(&rect, fill);
        }
        if let Some((color, width)) = style.stroke {
            let w = (width.max(1.0)) as f64;
            let (min, max) = (rect.min, rect.max);
            self.fill(&Bounds::from_coords(min.x, min.y, max.x, min.y + w), color);
            self.fill(&Bounds::from_coords(min.x, max.y - w, max.x, max.y), color);
            self.fill(&Bounds::from_coords(min.x, min.y + w, min.x + w, max.y - w), color);
            self.fill(&Bounds::from_coords(max.x - w, min.y + w, max.x, max.y - w), color);
        }
    }

    fn draw_text(&mut self, position: Point, text: &str, style: TextStyle) {
        if let Some(background) = style.background {
            self.fill(&style.text_box(position, text), background);
        }
        self.labels.push((position, text.to_string()));
    }
}
