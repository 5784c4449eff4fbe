use ndarray::Array2;
use palette::{LinSrgb, Mix, Srgb};
use serde::{Deserialize, Serialize};

use crate::data::model::finite_range;

// ---------------------------------------------------------------------------
// Continuous colour ramps for map rendering
// ---------------------------------------------------------------------------

/// Colour ramp used to render a single band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorRamp {
    /// Bare ground brown to dense vegetation green.
    Greens,
    /// Blue below zero, white at zero, red above; symmetric range.
    Diverging,
}

impl ColorRamp {
    fn stops(self) -> &'static [(f32, f32, f32)] {
        match self {
            ColorRamp::Greens => &[
                (0.55, 0.40, 0.25),
                (0.93, 0.90, 0.65),
                (0.45, 0.75, 0.35),
                (0.05, 0.40, 0.15),
            ],
            ColorRamp::Diverging => &[
                (0.13, 0.29, 0.63),
                (0.97, 0.97, 0.97),
                (0.70, 0.09, 0.17),
            ],
        }
    }

    /// Colour at position `t` in `[0, 1]`, interpolated in linear RGB.
    pub fn at(self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = t.clamp(0.0, 1.0) as f32 * (stops.len() - 1) as f32;
        let i = (t.floor() as usize).min(stops.len() - 2);
        let frac = t - i as f32;

        let lin = |(r, g, b): (f32, f32, f32)| -> LinSrgb { Srgb::new(r, g, b).into_linear() };
        let mixed: Srgb = Srgb::from_linear(lin(stops[i]).mix(lin(stops[i + 1]), frac));
        let mixed: Srgb<u8> = mixed.into_format();
        [mixed.red, mixed.green, mixed.blue]
    }

    /// Value range the ramp spans for a band: `(lo, hi)` of the finite
    /// cells, made symmetric around zero for [`ColorRamp::Diverging`].
    pub fn range_for(self, data: &Array2<f64>) -> Option<(f64, f64)> {
        let (lo, hi) = finite_range(data.iter().copied())?;
        Some(match self {
            ColorRamp::Greens => (lo, hi),
            ColorRamp::Diverging => {
                let m = lo.abs().max(hi.abs());
                (-m, m)
            }
        })
    }

    /// Render a band as row-major RGBA bytes; missing cells are transparent.
    pub fn render_rgba(self, data: &Array2<f64>) -> Vec<u8> {
        let range = self.range_for(data);
        let mut out = Vec::with_capacity(data.len() * 4);
        for &v in data.iter() {
            match range {
                Some((lo, hi)) if v.is_finite() => {
                    let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
                    let [r, g, b] = self.at(t);
                    out.extend_from_slice(&[r, g, b, 255]);
                }
                _ => out.extend_from_slice(&[0, 0, 0, 0]),
            }
        }
        out
    }
}
