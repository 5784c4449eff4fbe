use anyhow::{Context, Result};

use ndvi_explorer::analysis::calc::standardize;
use ndvi_explorer::analysis::overlay::{DeviationReference, zone_deviation};
use ndvi_explorer::analysis::pca::Pca;
use ndvi_explorer::analysis::sample::{PixelSample, sample_random};
use ndvi_explorer::analysis::stats::Statistic;
use ndvi_explorer::analysis::zonal::{ZonalStat, ZonalTable, zonal};
use ndvi_explorer::data::filter::{ViewFilter, filtered_indices, visible_layers};
use ndvi_explorer::data::model::{Raster, RasterStack, ZoneId, ZoneRaster};
use ndvi_explorer::data::zones::{ZoneOrigin, ZoneResolution};
use ndvi_explorer::ramp::ColorRamp;
use ndvi_explorer::walkthrough::WalkthroughResults;

use crate::color::ZoneColors;

// ---------------------------------------------------------------------------
// What the central panel shows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    PixelSeries,
    ZonalMeans,
    Loadings,
    Map,
}

/// Band rendered in the map view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapLayer {
    Ndvi(usize),
    Standardized(usize),
    Score(usize),
    Deviation(usize),
}

impl MapLayer {
    pub fn ramp(self) -> ColorRamp {
        match self {
            MapLayer::Ndvi(_) => ColorRamp::Greens,
            _ => ColorRamp::Diverging,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Loaded (possibly cropped) stack; None until user loads data.
    pub stack: Option<RasterStack>,
    pub standardized: Option<RasterStack>,
    pub zones: Option<ZoneRaster>,
    pub zone_origin: Option<ZoneOrigin>,
    pub sample: Option<PixelSample>,
    pub zonal: Option<ZonalTable>,
    pub pca: Option<Pca>,
    pub scores: Option<RasterStack>,
    pub deviation: Option<RasterStack>,

    /// Zone and date selection.
    pub filter: ViewFilter,
    /// Indices of sampled pixels passing the filter (cached).
    pub visible_pixels: Vec<usize>,
    /// Indices of layers inside the date range (cached).
    pub visible_layers: Vec<usize>,
    pub zone_colors: Option<ZoneColors>,

    pub view: View,
    pub map_layer: MapLayer,
    /// Pixel picked on the map, highlighted in the series plot.
    pub picked: Option<(usize, usize)>,

    pub sample_size: usize,
    pub seed: u64,
    pub pca_components: usize,
    pub use_correlation: bool,
    /// Reference zone for deviation maps; each pixel's own zone when None.
    pub deviation_reference: Option<ZoneId>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            stack: None,
            standardized: None,
            zones: None,
            zone_origin: None,
            sample: None,
            zonal: None,
            pca: None,
            scores: None,
            deviation: None,
            filter: ViewFilter::default(),
            visible_pixels: Vec::new(),
            visible_layers: Vec::new(),
            zone_colors: None,
            view: View::PixelSeries,
            map_layer: MapLayer::Ndvi(0),
            picked: None,
            sample_size: 100,
            seed: 42,
            pca_components: 3,
            use_correlation: false,
            deviation_reference: None,
            status_message: None,
        }
    }
}

impl AppState {
    /// Ingest a newly loaded stack; everything derived from the previous
    /// one is dropped.
    pub fn set_stack(&mut self, stack: RasterStack) {
        self.standardized = Some(standardize(&stack));
        self.stack = Some(stack);
        self.zones = None;
        self.zone_origin = None;
        self.zonal = None;
        self.pca = None;
        self.scores = None;
        self.deviation = None;
        self.picked = None;
        self.map_layer = MapLayer::Ndvi(0);
        self.resample();
        self.reset_filter();
        self.status_message = None;
    }

    /// Attach zones to the loaded stack and recompute zone-dependent results.
    pub fn set_zones(&mut self, resolution: ZoneResolution) -> Result<()> {
        let stack = self.stack.as_ref().context("load a raster stack before zones")?;
        let table = zonal(stack, &resolution.zones, ZonalStat::Mean)?;
        if let Some(z) = self.deviation_reference {
            if table.zone_index(z).is_none() {
                self.deviation_reference = None;
            }
        }
        self.zonal = Some(table);
        self.zones = Some(resolution.zones);
        self.zone_origin = Some(resolution.origin);
        self.recompute_deviation()?;
        self.resample();
        self.reset_filter();
        Ok(())
    }

    /// Take over everything a walkthrough run produced.
    pub fn apply_results(&mut self, results: WalkthroughResults) {
        self.stack = Some(results.stack);
        self.standardized = Some(results.standardized);
        self.zones = results.zones;
        self.zone_origin = results.report.zone_origin;
        self.deviation_reference = results.report.deviation_reference;
        self.sample_size = results.sample.len().max(1);
        self.sample = Some(results.sample);
        self.zonal = results.zonal;
        self.pca_components = results.scores.nlayers();
        self.use_correlation = results.pca.statistic == Statistic::Correlation;
        self.pca = Some(results.pca);
        self.scores = Some(results.scores);
        self.deviation = results.deviation;
        self.picked = None;
        self.map_layer = MapLayer::Score(0);
        self.view = View::Map;
        self.reset_filter();
        self.status_message = None;
    }

    /// Draw a new pixel sample with the current size and seed.
    pub fn resample(&mut self) {
        if let Some(stack) = &self.stack {
            self.sample = Some(sample_random(
                stack,
                self.zones.as_ref(),
                self.sample_size,
                self.seed,
            ));
        }
        self.refilter();
    }

    /// Fit components on the loaded stack and predict score maps.
    pub fn run_pca(&mut self) -> Result<()> {
        let stack = self.stack.as_ref().context("no stack loaded")?;
        let pca = Pca::fit(stack, self.use_correlation)?;
        let n = self.pca_components.clamp(1, pca.ncomponents());
        let scores = pca.predict(stack, n)?;
        log::info!(
            "PCA over {} complete cells, PC1 explains {:.1}%",
            pca.n_obs,
            pca.summary().first().map(|c| c.proportion * 100.0).unwrap_or(0.0)
        );
        self.pca_components = n;
        self.pca = Some(pca);
        self.scores = Some(scores);
        Ok(())
    }

    pub fn recompute_deviation(&mut self) -> Result<()> {
        self.deviation = match (&self.stack, &self.zones, &self.zonal) {
            (Some(stack), Some(zones), Some(means)) => {
                let reference = self
                    .deviation_reference
                    .map(DeviationReference::Zone)
                    .unwrap_or(DeviationReference::OwnZone);
                Some(zone_deviation(stack, zones, means, reference)?)
            }
            _ => None,
        };
        Ok(())
    }

    fn reset_filter(&mut self) {
        let zone_ids = self.zones.as_ref().map(|z| z.zone_ids()).unwrap_or_default();
        let layers = self
            .stack
            .as_ref()
            .map(|s| s.layers.clone())
            .unwrap_or_default();
        self.filter = ViewFilter::select_all(&zone_ids, &layers);
        self.zone_colors = Some(ZoneColors::new(&zone_ids));
        self.refilter();
    }

    /// Recompute cached visible pixels and layers after a filter change.
    pub fn refilter(&mut self) {
        self.visible_pixels = match &self.sample {
            Some(s) => filtered_indices(s.cells.iter().map(|c| c.zone), &self.filter),
            None => Vec::new(),
        };
        self.visible_layers = match &self.stack {
            Some(s) => visible_layers(&s.layers, &self.filter),
            None => Vec::new(),
        };
    }

    /// Toggle a single zone in the filter.
    pub fn toggle_zone(&mut self, zone: ZoneId) {
        self.filter.toggle_zone(zone);
        self.refilter();
    }

    pub fn select_all_zones(&mut self) {
        if let Some(z) = &self.zones {
            self.filter.zones = z.zone_ids().into_iter().collect();
            self.filter.show_unzoned = true;
            self.refilter();
        }
    }

    pub fn select_no_zones(&mut self) {
        self.filter.zones.clear();
        self.filter.show_unzoned = false;
        self.refilter();
    }

    /// Number of bands available for a map layer kind.
    pub fn band_count(&self, layer: MapLayer) -> usize {
        let stack = match layer {
            MapLayer::Ndvi(_) => self.stack.as_ref(),
            MapLayer::Standardized(_) => self.standardized.as_ref(),
            MapLayer::Score(_) => self.scores.as_ref(),
            MapLayer::Deviation(_) => self.deviation.as_ref(),
        };
        stack.map(RasterStack::nlayers).unwrap_or(0)
    }

    /// The band selected for the map view.
    pub fn map_raster(&self) -> Option<Raster> {
        let (stack, i) = match self.map_layer {
            MapLayer::Ndvi(i) => (self.stack.as_ref()?, i),
            MapLayer::Standardized(i) => (self.standardized.as_ref()?, i),
            MapLayer::Score(i) => (self.scores.as_ref()?, i),
            MapLayer::Deviation(i) => (self.deviation.as_ref()?, i),
        };
        (i < stack.nlayers()).then(|| stack.layer_raster(i))
    }

    /// Label of the selected map band.
    pub fn map_label(&self) -> String {
        let name = |s: &Option<RasterStack>, i: usize| {
            s.as_ref()
                .and_then(|s| s.layers.get(i))
                .map(|l| l.label())
                .unwrap_or_default()
        };
        match self.map_layer {
            MapLayer::Ndvi(i) => format!("NDVI {}", name(&self.stack, i)),
            MapLayer::Standardized(i) => format!("Standardized {}", name(&self.standardized, i)),
            MapLayer::Score(i) => format!("{} score", name(&self.scores, i)),
            MapLayer::Deviation(i) => format!("Deviation {}", name(&self.deviation, i)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;
    use ndvi_explorer::data::model::{GeoTransform, LayerInfo};

    fn stack() -> RasterStack {
        let layers = (0..4)
            .map(|k| {
                let date = NaiveDate::from_yo_opt(2005, 129 + 16 * k).unwrap();
                let band = Array2::from_shape_fn((6, 6), |(r, c)| {
                    0.2 + 0.05 * k as f64 + 0.01 * (r * 6 + c) as f64 * (1.0 + k as f64 * 0.3)
                });
                (LayerInfo::new(format!("ndvi_{k}"), Some(date)), band)
            })
            .collect();
        RasterStack::from_layers(GeoTransform::default(), layers).unwrap()
    }

    fn zones() -> ZoneResolution {
        let zones = Array2::from_shape_fn((6, 6), |(r, _)| if r < 3 { Some(1) } else { Some(2) });
        ZoneResolution {
            zones: ZoneRaster::new(GeoTransform::default(), zones),
            origin: ZoneOrigin::Fallback,
        }
    }

    #[test]
    fn loading_a_stack_samples_and_selects_everything() {
        let mut state = AppState::default();
        state.sample_size = 10;
        state.set_stack(stack());
        assert_eq!(state.sample.as_ref().unwrap().len(), 10);
        assert_eq!(state.visible_pixels.len(), 10);
        assert_eq!(state.visible_layers, vec![0, 1, 2, 3]);
        assert!(state.standardized.is_some());
    }

    #[test]
    fn zones_drive_zonal_means_deviation_and_filter() {
        let mut state = AppState::default();
        state.sample_size = 36;
        state.set_stack(stack());
        state.set_zones(zones()).unwrap();
        assert_eq!(state.zonal.as_ref().unwrap().zone_ids, vec![1, 2]);
        assert!(state.deviation.is_some());

        state.toggle_zone(2);
        let sample = state.sample.as_ref().unwrap();
        assert!(state
            .visible_pixels
            .iter()
            .all(|&i| sample.cells[i].zone == Some(1)));
        assert_eq!(state.visible_pixels.len(), 18);

        state.select_no_zones();
        assert!(state.visible_pixels.is_empty());
        state.select_all_zones();
        assert_eq!(state.visible_pixels.len(), 36);
    }

    #[test]
    fn zones_need_a_stack() {
        let mut state = AppState::default();
        assert!(state.set_zones(zones()).is_err());
    }

    #[test]
    fn pca_produces_score_maps_for_the_map_view() {
        let mut state = AppState::default();
        state.set_stack(stack());
        state.pca_components = 9;
        state.run_pca().unwrap();
        assert_eq!(state.pca_components, 4);
        assert_eq!(state.band_count(MapLayer::Score(0)), 4);

        state.map_layer = MapLayer::Score(1);
        assert!(state.map_raster().is_some());
        assert_eq!(state.map_label(), "PC2 score");
        state.map_layer = MapLayer::Deviation(0);
        assert!(state.map_raster().is_none());
    }

    #[test]
    fn new_stack_clears_previous_error_and_results() {
        let mut state = AppState::default();
        state.set_stack(stack());
        state.set_zones(zones()).unwrap();
        state.run_pca().unwrap();
        state.status_message = Some("Error: no rasters".to_string());

        state.set_stack(stack());
        assert!(state.status_message.is_none());
        assert!(state.zones.is_none() && state.zonal.is_none() && state.deviation.is_none());
        assert!(state.pca.is_none() && state.scores.is_none());
        assert_eq!(state.map_layer, MapLayer::Ndvi(0));
    }
}
