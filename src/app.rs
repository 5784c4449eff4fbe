use eframe::egui;

use crate::state::{AppState, View};
use crate::ui::map::MapView;
use crate::ui::{map, panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct NdviExplorerApp {
    pub state: AppState,
    map: MapView,
}

impl eframe::App for NdviExplorerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            if panels::top_bar(ui, &mut self.state).rasters_changed {
                self.map.invalidate();
            }
        });

        // ---- Left side panel: zones, dates, sample, PCA ----
        egui::SidePanel::left("filter_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                if panels::side_panel(ui, &mut self.state).rasters_changed {
                    self.map.invalidate();
                }
            });

        // ---- Central panel: plot or map ----
        egui::CentralPanel::default().show(ctx, |ui| match self.state.view {
            View::PixelSeries => plot::pixel_series_plot(ui, &self.state),
            View::ZonalMeans => plot::zonal_means_plot(ui, &self.state),
            View::Loadings => plot::loadings_plot(ui, &self.state),
            View::Map => map::raster_map(ui, &mut self.state, &mut self.map),
        });
    }
}
