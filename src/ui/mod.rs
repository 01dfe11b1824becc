//! egui integration: a [`Surface`](crate::rendering::Surface) over an egui
//! painter and a widget helper that drives a [`TileLayer`].

pub mod painter;

pub use painter::{EguiSurface, TextureCache};

use crate::core::geo::Point;
use crate::core::viewport::Viewport;
use crate::layers::tile::{FrameReport, TileLayer};

/// Scale change per scrolled point
const SCROLL_ZOOM_RATE: f64 = 0.002;

pub trait UiTileLayerExt {
    /// Paint `layer` into the available space, panning on drag and zooming
    /// on scroll. The viewport is resized to the allocated rectangle.
    fn tile_layer(
        &mut self,
        layer: &mut TileLayer,
        viewport: &mut Viewport,
        textures: &mut TextureCache,
    ) -> (egui::Response, FrameReport);
}

impl UiTileLayerExt for egui::Ui {
    fn tile_layer(
        &mut self,
        layer: &mut TileLayer,
        viewport: &mut Viewport,
        textures: &mut TextureCache,
    ) -> (egui::Response, FrameReport) {
        let desired_size = self.available_size();
        let (rect, response) = self.allocate_exact_size(desired_size, egui::Sense::click_and_drag());
        viewport.set_size(Point::new(rect.width() as f64, rect.height() as f64));

        let drag_delta = response.drag_delta();
        if drag_delta.length_sq() > 0.0 {
            viewport.pan(Point::new(-drag_delta.x as f64, -drag_delta.y as f64));
        }
        if response.hovered() {
            let scroll_delta = self.input(|i| i.raw_scroll_delta.y);
            if scroll_delta.abs() > 0.1 {
                viewport.zoom_by((-(scroll_delta as f64) * SCROLL_ZOOM_RATE).exp());
            }
        }
        if response.secondary_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = Point::new((pos.x - rect.min.x) as f64, (pos.y - rect.min.y) as f64);
                layer.inspect_tile_at(viewport, &local);
            }
        }

        let painter = self.painter_at(rect);
        let report = {
            let mut surface = EguiSurface::new(&painter, textures, rect);
            layer.paint(viewport, &mut surface)
        };
        textures.end_frame();

        if layer.needs_repaint() || layer.manager().outstanding_count() > 0 {
            self.ctx().request_repaint();
        }
        (response, report)
    }
}
