use std::path::Path;

use eframe::egui::{self, Color32, DragValue, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;

use ndvi_explorer::config::WalkthroughConfig;
use ndvi_explorer::data::RasterError;
use ndvi_explorer::data::model::ZoneId;
use ndvi_explorer::data::loader::{StackSource, load_stack};
use ndvi_explorer::data::zones::{ZoneOrigin, ZoneSource, load_zones};
use ndvi_explorer::walkthrough;

use crate::state::{AppState, MapLayer, View};

/// Something the panels changed that the app must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelOutcome {
    pub rasters_changed: bool,
}

// ---------------------------------------------------------------------------
// Left side panel – view, filter and analysis widgets
// ---------------------------------------------------------------------------

/// Render the left side panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) -> PanelOutcome {
    let mut outcome = PanelOutcome::default();

    ui.heading("View");
    ui.horizontal_wrapped(|ui: &mut Ui| {
        ui.selectable_value(&mut state.view, View::PixelSeries, "Pixels");
        ui.selectable_value(&mut state.view, View::ZonalMeans, "Zonal means");
        ui.selectable_value(&mut state.view, View::Loadings, "Loadings");
        ui.selectable_value(&mut state.view, View::Map, "Map");
    });
    ui.separator();

    if state.stack.is_none() {
        ui.label("No raster stack loaded.");
        return outcome;
    }

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            if zone_section(ui, state) {
                outcome.rasters_changed = true;
            }
            date_section(ui, state);
            sample_section(ui, state);
            if pca_section(ui, state) {
                outcome.rasters_changed = true;
            }
            if state.view == View::Map {
                map_section(ui, state);
            }
        });

    // Recompute visible pixels and layers after any widget changes.
    state.refilter();
    outcome
}

/// Returns true when the deviation maps were recomputed.
fn zone_section(ui: &mut Ui, state: &mut AppState) -> bool {
    let Some(zones) = &state.zones else {
        ui.label("No zones loaded.");
        ui.separator();
        return false;
    };
    let zone_ids = zones.zone_ids();
    let origin = match state.zone_origin {
        Some(ZoneOrigin::Rasterized) => "polygons",
        Some(ZoneOrigin::Fallback) => "fallback raster",
        None => "unknown",
    };
    let n_selected = state.filter.zones.len();
    let header = format!("Zones  ({n_selected}/{})", zone_ids.len());

    egui::CollapsingHeader::new(RichText::new(header).strong())
        .id_salt("zones")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            ui.small(format!("from {origin}"));
            ui.horizontal(|ui: &mut Ui| {
                if ui.small_button("All").clicked() {
                    state.select_all_zones();
                }
                if ui.small_button("None").clicked() {
                    state.select_no_zones();
                }
            });

            let legend = state
                .zone_colors
                .as_ref()
                .map(|zc| zc.legend_entries())
                .unwrap_or_default();
            for zone in &zone_ids {
                let mut checked = state.filter.zones.contains(zone);
                let color = legend
                    .iter()
                    .find(|(label, _)| *label == format!("zone {zone}"))
                    .map(|(_, c)| *c)
                    .unwrap_or(Color32::GRAY);
                let text = RichText::new(format!("zone {zone}")).color(color);
                if ui.checkbox(&mut checked, text).changed() {
                    state.filter.toggle_zone(*zone);
                }
            }
            ui.checkbox(
                &mut state.filter.show_unzoned,
                RichText::new("unzoned").color(Color32::GRAY),
            );
        });

    let label = |r: Option<ZoneId>| match r {
        Some(z) => format!("zone {z}"),
        None => "own zone".to_string(),
    };
    let before = state.deviation_reference;
    ui.horizontal(|ui: &mut Ui| {
        ui.label("deviation from");
        egui::ComboBox::from_id_salt("deviation_reference")
            .selected_text(label(before))
            .show_ui(ui, |ui: &mut Ui| {
                ui.selectable_value(&mut state.deviation_reference, None, label(None));
                for zone in &zone_ids {
                    ui.selectable_value(&mut state.deviation_reference, Some(*zone), label(Some(*zone)));
                }
            });
    });
    let mut recomputed = false;
    if state.deviation_reference != before {
        match state.recompute_deviation() {
            Ok(()) => recomputed = true,
            Err(e) => {
                log::error!("Deviation failed: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
    ui.separator();
    recomputed
}

fn date_section(ui: &mut Ui, state: &mut AppState) {
    let (Some(mut from), Some(mut to)) = (state.filter.date_from, state.filter.date_to) else {
        return;
    };
    ui.strong("Dates");
    egui::Grid::new("date_range").num_columns(2).show(ui, |ui: &mut Ui| {
        ui.label("from");
        ui.add(DatePickerButton::new(&mut from).id_salt("date_from"));
        ui.end_row();
        ui.label("to");
        ui.add(DatePickerButton::new(&mut to).id_salt("date_to"));
        ui.end_row();
    });
    if from > to {
        std::mem::swap(&mut from, &mut to);
    }
    state.filter.date_from = Some(from);
    state.filter.date_to = Some(to);
    ui.label(format!("{} layers visible", state.visible_layers.len()));
    ui.separator();
}

fn sample_section(ui: &mut Ui, state: &mut AppState) {
    ui.strong("Pixel sample");
    let mut changed = false;
    egui::Grid::new("sample").num_columns(2).show(ui, |ui: &mut Ui| {
        ui.label("size");
        changed |= ui
            .add(DragValue::new(&mut state.sample_size).range(1..=5000))
            .changed();
        ui.end_row();
        ui.label("seed");
        changed |= ui.add(DragValue::new(&mut state.seed)).changed();
        ui.end_row();
    });
    let clicked = ui.button("Resample").clicked();
    if changed || clicked {
        state.resample();
    }
    ui.separator();
}

/// Returns true when new score rasters were produced.
fn pca_section(ui: &mut Ui, state: &mut AppState) -> bool {
    ui.strong("Principal components");
    let nlayers = state.stack.as_ref().map(|s| s.nlayers()).unwrap_or(1);
    ui.horizontal(|ui: &mut Ui| {
        ui.label("components");
        ui.add(DragValue::new(&mut state.pca_components).range(1..=nlayers.max(1)));
    });
    ui.checkbox(&mut state.use_correlation, "correlation matrix");

    let mut ran = false;
    if ui.button("Run PCA").clicked() {
        match state.run_pca() {
            Ok(()) => {
                state.status_message = None;
                ran = true;
            }
            Err(e) => {
                log::error!("PCA failed: {e:#}");
                state.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    if let Some(pca) = &state.pca {
        egui::Grid::new("pca_summary").striped(true).show(ui, |ui: &mut Ui| {
            ui.small("");
            ui.small("sdev");
            ui.small("prop.");
            ui.small("cum.");
            ui.end_row();
            for c in pca.summary().iter().take(state.pca_components) {
                ui.small(&c.name);
                ui.small(format!("{:.3}", c.sdev));
                ui.small(format!("{:.3}", c.proportion));
                ui.small(format!("{:.3}", c.cumulative));
                ui.end_row();
            }
        });
    }
    ui.separator();
    ran
}

fn map_section(ui: &mut Ui, state: &mut AppState) {
    ui.strong("Map layer");
    let (kind, band) = match state.map_layer {
        MapLayer::Ndvi(i) => (0, i),
        MapLayer::Standardized(i) => (1, i),
        MapLayer::Score(i) => (2, i),
        MapLayer::Deviation(i) => (3, i),
    };
    let names = ["NDVI", "Standardized", "PC scores", "Zone deviation"];
    let mut kind_sel = kind;
    egui::ComboBox::from_id_salt("map_layer")
        .selected_text(names[kind])
        .show_ui(ui, |ui: &mut Ui| {
            for (k, name) in names.iter().enumerate() {
                ui.selectable_value(&mut kind_sel, k, *name);
            }
        });

    let build = |k: usize, i: usize| match k {
        0 => MapLayer::Ndvi(i),
        1 => MapLayer::Standardized(i),
        2 => MapLayer::Score(i),
        _ => MapLayer::Deviation(i),
    };
    let count = state.band_count(build(kind_sel, 0));
    let mut band_sel = if kind_sel == kind { band } else { 0 };
    if count > 1 {
        ui.add(egui::Slider::new(&mut band_sel, 0..=count - 1).text("band"));
    } else if count == 0 {
        ui.small("not computed yet");
    }
    state.map_layer = build(kind_sel, band_sel.min(count.saturating_sub(1)));
    ui.separator();
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) -> PanelOutcome {
    let mut outcome = PanelOutcome::default();
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open raster folder…").clicked() {
                outcome.rasters_changed |= open_folder_dialog(state);
                ui.close_menu();
            }
            let has_stack = state.stack.is_some();
            if ui
                .add_enabled(has_stack, egui::Button::new("Open zones…"))
                .clicked()
            {
                outcome.rasters_changed |= open_zones_dialog(state);
                ui.close_menu();
            }
            if ui.button("Run walkthrough config…").clicked() {
                outcome.rasters_changed |= run_config_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(stack) = &state.stack {
            ui.label(format!(
                "{} layers, {}×{} cells, {} of {} sampled pixels visible",
                stack.nlayers(),
                stack.rows(),
                stack.cols(),
                state.visible_pixels.len(),
                state.sample.as_ref().map(|s| s.len()).unwrap_or(0)
            ));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
    outcome
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

fn report_error(state: &mut AppState, what: &str, e: &anyhow::Error) {
    log::error!("{what}: {e:#}");
    state.status_message = Some(format!("Error: {e:#}"));
}

pub fn open_folder_dialog(state: &mut AppState) -> bool {
    let Some(dir) = rfd::FileDialog::new()
        .set_title("Open NDVI raster folder")
        .pick_folder()
    else {
        return false;
    };

    match load_stack(&StackSource::in_dir(dir.clone())) {
        Ok(stack) => {
            log::info!(
                "Loaded {} layers of {}x{} from {}",
                stack.nlayers(),
                stack.rows(),
                stack.cols(),
                dir.display()
            );
            state.set_stack(stack);
            true
        }
        Err(e) => {
            report_error(state, "Failed to load rasters", &anyhow::Error::from(e));
            false
        }
    }
}

/// Zone source for a picked file: polygons for GeoJSON, otherwise a
/// pre-rasterized zone GeoTIFF.
fn zone_source_for(path: &Path) -> ZoneSource {
    let is_geojson = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_geojson {
        ZoneSource {
            polygons: Some(path.to_path_buf()),
            ..ZoneSource::default()
        }
    } else {
        ZoneSource {
            fallback_raster: Some(path.to_path_buf()),
            ..ZoneSource::default()
        }
    }
}

pub fn open_zones_dialog(state: &mut AppState) -> bool {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Open burn-scar zones")
        .add_filter("Supported files", &["geojson", "json", "tif", "tiff"])
        .add_filter("GeoJSON polygons", &["geojson", "json"])
        .add_filter("Zone raster", &["tif", "tiff"])
        .pick_file()
    else {
        return false;
    };
    let Some(stack) = &state.stack else {
        return false;
    };

    match load_zones(&zone_source_for(&path), stack) {
        Ok(resolution) => {
            log::info!(
                "Loaded zones {:?} from {} ({:?})",
                resolution.zones.zone_ids(),
                path.display(),
                resolution.origin
            );
            match state.set_zones(resolution) {
                Ok(()) => {
                    state.status_message = None;
                    true
                }
                Err(e) => {
                    report_error(state, "Failed to summarize zones", &e);
                    false
                }
            }
        }
        Err(RasterError::NoZoneFallback(cause)) => {
            log::warn!("Polygons unusable and no fallback raster: {cause}");
            state.status_message = Some(format!(
                "{cause}. Open a pre-rasterized zone GeoTIFF instead."
            ));
            false
        }
        Err(e) => {
            report_error(state, "Failed to load zones", &anyhow::Error::from(e));
            false
        }
    }
}

pub fn run_config_dialog(state: &mut AppState) -> bool {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Run walkthrough configuration")
        .add_filter("Walkthrough config", &["json"])
        .pick_file()
    else {
        return false;
    };

    let results = WalkthroughConfig::load(&path).and_then(|config| walkthrough::run(&config));
    match results {
        Ok(results) => {
            log::info!(
                "Walkthrough wrote {} outputs",
                results.report.outputs.len()
            );
            state.apply_results(results);
            true
        }
        Err(e) => {
            report_error(state, "Walkthrough failed", &e);
            false
        }
    }
}
