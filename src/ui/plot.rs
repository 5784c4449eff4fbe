use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, Plot, Points};
use ndarray::ArrayView1;

use ndvi_explorer::data::model::LayerInfo;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Time-series plots (central panel)
// ---------------------------------------------------------------------------

/// X coordinate of a layer: day of year, or its index when undated.
fn layer_x(layer: &LayerInfo, index: usize) -> f64 {
    layer.doy().map(f64::from).unwrap_or(index as f64)
}

/// Points for the visible layers of one series; missing values are skipped.
fn series_points(layers: &[LayerInfo], values: ArrayView1<'_, f64>, visible: &[usize]) -> Vec<[f64; 2]> {
    visible
        .iter()
        .filter(|&&i| i < layers.len() && values[i].is_finite())
        .map(|&i| [layer_x(&layers[i], i), values[i]])
        .collect()
}

fn empty_hint(ui: &mut Ui, text: &str) {
    ui.centered_and_justified(|ui: &mut Ui| {
        ui.heading(text);
    });
}

/// NDVI trajectories of the sampled pixels, coloured by zone.
pub fn pixel_series_plot(ui: &mut Ui, state: &AppState) {
    let Some(sample) = &state.sample else {
        empty_hint(ui, "Open a raster folder to view pixels  (File → Open raster folder…)");
        return;
    };
    let picked = state.picked.and_then(|(row, col)| {
        let stack = state.stack.as_ref()?;
        Some((row, col, stack.pixel(row, col).to_owned()))
    });

    Plot::new("pixel_series")
        .legend(Legend::default())
        .x_axis_label("Day of year")
        .y_axis_label("NDVI")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for &idx in &state.visible_pixels {
                let cell = &sample.cells[idx];
                let color = state
                    .zone_colors
                    .as_ref()
                    .map(|zc| zc.color_for(cell.zone))
                    .unwrap_or(Color32::LIGHT_GREEN);
                let name = match cell.zone {
                    Some(z) => format!("zone {z}"),
                    None => "unzoned".to_string(),
                };
                let points = series_points(&sample.layers, sample.values.row(idx), &state.visible_layers);
                plot_ui.line(Line::new(points).name(name).color(color).width(1.0));
            }

            if let Some((row, col, values)) = &picked {
                let label = format!("pixel ({row}, {col})");
                let points = series_points(&sample.layers, values.view(), &state.visible_layers);
                let markers = points.clone();
                plot_ui.line(Line::new(points).name(&label).color(Color32::WHITE).width(2.5));
                plot_ui.points(Points::new(markers).name(&label).color(Color32::WHITE).radius(3.0));
            }
        });
}

/// Mean NDVI per zone over time.
pub fn zonal_means_plot(ui: &mut Ui, state: &AppState) {
    let Some(table) = &state.zonal else {
        empty_hint(ui, "Open zones to view zonal means  (File → Open zones…)");
        return;
    };

    Plot::new("zonal_means")
        .legend(Legend::default())
        .x_axis_label("Day of year")
        .y_axis_label(format!("NDVI ({:?})", table.stat).to_lowercase())
        .show(ui, |plot_ui| {
            for (k, &zone) in table.zone_ids.iter().enumerate() {
                if !state.filter.zone_passes(Some(zone)) {
                    continue;
                }
                let color = state
                    .zone_colors
                    .as_ref()
                    .map(|zc| zc.color_for(Some(zone)))
                    .unwrap_or(Color32::LIGHT_BLUE);
                let name = format!("zone {zone} ({} cells)", table.cell_counts[k]);
                let points = series_points(&table.layers, table.values.row(k), &state.visible_layers);
                let markers = points.clone();
                plot_ui.line(Line::new(points).name(&name).color(color).width(2.0));
                plot_ui.points(Points::new(markers).name(&name).color(color).radius(2.5));
            }
        });
}

/// Component loadings against acquisition date.
pub fn loadings_plot(ui: &mut Ui, state: &AppState) {
    let Some(pca) = &state.pca else {
        empty_hint(ui, "Run PCA from the side panel to view loadings");
        return;
    };
    let n = state.pca_components.min(pca.ncomponents());
    let palette = crate::color::generate_palette(n);
    let summary = pca.summary();

    Plot::new("loadings")
        .legend(Legend::default())
        .x_axis_label("Day of year")
        .y_axis_label("Loading")
        .show(ui, |plot_ui| {
            for (k, color) in palette.into_iter().enumerate() {
                let name = format!("{} ({:.1}%)", summary[k].name, summary[k].proportion * 100.0);
                let points = series_points(&pca.layers, pca.loading(k), &state.visible_layers);
                plot_ui.line(Line::new(points).name(name).color(color).width(2.0));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    #[test]
    fn series_skip_missing_values_and_hidden_layers() {
        let layers = vec![
            LayerInfo::new("a", NaiveDate::from_yo_opt(2005, 129)),
            LayerInfo::new("b", NaiveDate::from_yo_opt(2005, 145)),
            LayerInfo::new("c", None),
        ];
        let values = array![0.5, f64::NAN, 0.7];
        let points = series_points(&layers, values.view(), &[0, 1, 2]);
        assert_eq!(points, vec![[129.0, 0.5], [2.0, 0.7]]);

        let points = series_points(&layers, values.view(), &[2]);
        assert_eq!(points.len(), 1);
    }
}
