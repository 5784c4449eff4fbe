use std::collections::BTreeMap;

use eframe::egui::{Color32, ColorImage};
use palette::{Hsl, IntoColor, Srgb};

use ndvi_explorer::data::model::ZoneId;
use ndvi_explorer::ramp::ColorRamp;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Zone colours: zone id → Color32
// ---------------------------------------------------------------------------

/// Maps burn-scar zones to distinct colours; unzoned pixels are grey.
#[derive(Debug, Clone)]
pub struct ZoneColors {
    mapping: BTreeMap<ZoneId, Color32>,
    unzoned: Color32,
}

impl ZoneColors {
    pub fn new(zone_ids: &[ZoneId]) -> Self {
        let mapping = zone_ids
            .iter()
            .copied()
            .zip(generate_palette(zone_ids.len()))
            .collect();
        ZoneColors {
            mapping,
            unzoned: Color32::GRAY,
        }
    }

    pub fn color_for(&self, zone: Option<ZoneId>) -> Color32 {
        zone.and_then(|z| self.mapping.get(&z).copied())
            .unwrap_or(self.unzoned)
    }

    /// Return the legend entries (label → colour) for the UI.
    pub fn legend_entries(&self) -> Vec<(String, Color32)> {
        self.mapping
            .iter()
            .map(|(z, c)| (format!("zone {z}"), *c))
            .chain(std::iter::once(("unzoned".to_string(), self.unzoned)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Band → image
// ---------------------------------------------------------------------------

/// Render a band through a ramp into an egui image.
pub fn band_image(data: &ndarray::Array2<f64>, ramp: ColorRamp) -> ColorImage {
    let (rows, cols) = data.dim();
    ColorImage::from_rgba_unmultiplied([cols, rows], &ramp.render_rgba(data))
}
