use eframe::egui::{self, Color32, RichText, Sense, TextureHandle, TextureOptions, Ui, Vec2};

use ndvi_explorer::data::model::Raster;

use crate::color::band_image;
use crate::state::{AppState, MapLayer};

// ---------------------------------------------------------------------------
// Raster map (central panel)
// ---------------------------------------------------------------------------

/// Uploaded texture of the band currently shown, rebuilt when the band changes.
#[derive(Default)]
pub struct MapView {
    texture: Option<(MapLayer, TextureHandle)>,
    /// Bumped by the app whenever the underlying rasters are replaced.
    generation: u64,
    drawn_generation: u64,
}

impl MapView {
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn texture(&mut self, ui: &Ui, layer: MapLayer, raster: &Raster) -> TextureHandle {
        match &self.texture {
            Some((cached, handle)) if *cached == layer && self.drawn_generation == self.generation => {
                handle.clone()
            }
            _ => {
                let image = band_image(&raster.data, layer.ramp());
                let handle = ui
                    .ctx()
                    .load_texture("raster_map", image, TextureOptions::NEAREST);
                self.texture = Some((layer, handle.clone()));
                self.drawn_generation = self.generation;
                handle
            }
        }
    }
}

/// Row and column under a point of the drawn image.
fn cell_under(rect: egui::Rect, pos: egui::Pos2, rows: usize, cols: usize) -> Option<(usize, usize)> {
    if !rect.contains(pos) || rows == 0 || cols == 0 {
        return None;
    }
    let fx = (pos.x - rect.left()) / rect.width();
    let fy = (pos.y - rect.top()) / rect.height();
    let col = ((fx * cols as f32) as usize).min(cols - 1);
    let row = ((fy * rows as f32) as usize).min(rows - 1);
    Some((row, col))
}

/// Render the selected band; hovering shows the cell value, clicking picks
/// the pixel for the series plot.
pub fn raster_map(ui: &mut Ui, state: &mut AppState, view: &mut MapView) {
    let Some(raster) = state.map_raster() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Nothing to draw for this layer yet");
        });
        return;
    };
    let (rows, cols) = raster.data.dim();

    ui.horizontal(|ui: &mut Ui| {
        ui.strong(state.map_label());
        if let Some((lo, hi)) = state.map_layer.ramp().range_for(&raster.data) {
            ui.label(format!("range {lo:.3} … {hi:.3}"));
        }
    });

    let texture = view.texture(ui, state.map_layer, &raster);
    let available = ui.available_size();
    let scale = (available.x / cols as f32).min(available.y / rows as f32).max(0.1);
    let size = Vec2::new(cols as f32 * scale, rows as f32 * scale);

    let response = ui.add(egui::Image::new((texture.id(), size)).sense(Sense::click()));

    if let Some(pos) = response.hover_pos() {
        if let Some((row, col)) = cell_under(response.rect, pos, rows, cols) {
            let value = raster.data[[row, col]];
            let (x, y) = raster.transform.cell_center(row, col);
            let zone = state.zones.as_ref().and_then(|z| z.zone_at(row, col));
            let text = format!(
                "row {row}, col {col}  ({x:.4}, {y:.4})\nvalue {}\nzone {}",
                if value.is_finite() { format!("{value:.4}") } else { "NA".to_string() },
                zone.map(|z| z.to_string()).unwrap_or_else(|| "-".to_string())
            );
            response.clone().on_hover_text(RichText::new(text).monospace());
            if response.clicked() {
                state.picked = Some((row, col));
                log::debug!("picked cell ({row}, {col})");
            }
        }
    }

    if let Some((row, col)) = state.picked {
        if row < rows && col < cols {
            let cell = Vec2::splat(scale);
            let min = response.rect.min + Vec2::new(col as f32 * scale, row as f32 * scale);
            ui.painter().rect_stroke(
                egui::Rect::from_min_size(min, cell.max(Vec2::splat(3.0))),
                0.0,
                egui::Stroke::new(1.5, Color32::WHITE),
                egui::StrokeKind::Outside,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Pos2, Rect};

    #[test]
    fn pointer_maps_to_cells() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), Vec2::new(100.0, 50.0));
        assert_eq!(cell_under(rect, Pos2::new(10.0, 20.0), 5, 10), Some((0, 0)));
        assert_eq!(cell_under(rect, Pos2::new(109.9, 69.9), 5, 10), Some((4, 9)));
        assert_eq!(cell_under(rect, Pos2::new(35.0, 41.0), 5, 10), Some((2, 2)));
        assert_eq!(cell_under(rect, Pos2::new(5.0, 41.0), 5, 10), None);
    }
}
