use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::calc::standardize;
use crate::analysis::overlay::{DeviationReference, zone_deviation};
use crate::analysis::pca::{ComponentSummary, Pca};
use crate::analysis::sample::{PixelSample, sample_random};
use crate::analysis::stats::{LayerSummary, summarize};
use crate::analysis::zonal::{ZonalStat, ZonalTable, zonal};
use crate::config::WalkthroughConfig;
use crate::data::crop::crop_stack;
use crate::data::loader::load_stack;
use crate::data::model::{Extent, RasterStack, ZoneId, ZoneRaster};
use crate::data::writer::{write_png, write_stack};
use crate::data::zones::{ZoneOrigin, load_zones};
use crate::ramp::ColorRamp;

/// What a walkthrough run produced, written to `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct WalkthroughReport {
    pub layers: Vec<LayerSummary>,
    pub extent: Extent,
    pub rows: usize,
    pub cols: usize,
    pub sampled_pixels: usize,
    pub zone_origin: Option<ZoneOrigin>,
    pub zone_ids: Vec<ZoneId>,
    /// Reference zone of the deviation maps; `None` means each cell's own zone.
    pub deviation_reference: Option<ZoneId>,
    pub components: Vec<ComponentSummary>,
    pub outputs: Vec<PathBuf>,
}

/// In-memory results, for callers that keep exploring (the viewer).
#[derive(Debug, Clone)]
pub struct WalkthroughResults {
    pub stack: RasterStack,
    pub standardized: RasterStack,
    pub zones: Option<ZoneRaster>,
    pub sample: PixelSample,
    pub zonal: Option<ZonalTable>,
    pub pca: Pca,
    pub scores: RasterStack,
    pub deviation: Option<RasterStack>,
    pub report: WalkthroughReport,
}

struct Outputs<'a> {
    dir: &'a Path,
    written: Vec<PathBuf>,
}

impl Outputs<'_> {
    fn path(&mut self, name: &str) -> PathBuf {
        let p = self.dir.join(name);
        self.written.push(p.clone());
        p
    }
}

/// Replay the burn-scar lesson end to end, writing every intermediate to
/// `config.output_dir`.
pub fn run(config: &WalkthroughConfig) -> Result<WalkthroughResults> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let mut out = Outputs {
        dir: &config.output_dir,
        written: Vec::new(),
    };
    let ext = config.table_format.extension();

    // 1. Stack the dated rasters and look at each layer's range.
    let full = load_stack(&config.stack).context("loading the NDVI stack")?;
    for s in summarize(&full) {
        log::info!(
            "{} ({}): min {:.3} max {:.3}, {} NA cells",
            s.name,
            s.date.map(|d| d.to_string()).unwrap_or_else(|| "undated".into()),
            s.min,
            s.max,
            s.na_count
        );
    }

    // 2. Region of interest.
    let stack = match &config.crop {
        Some(extent) => {
            let cropped = crop_stack(&full, extent).context("cropping to the region of interest")?;
            log::info!(
                "Cropped {}x{} to {}x{} cells",
                full.rows(),
                full.cols(),
                cropped.rows(),
                cropped.cols()
            );
            cropped
        }
        None => full,
    };
    write_stack(&out.path("cropped_stack.tif"), &stack)?;

    // 3. Burn-scar zones: rasterize the polygons or fall back.
    let zoning_configured = config.zones.polygons.is_some() || config.zones.fallback_raster.is_some();
    let resolution = if zoning_configured {
        Some(load_zones(&config.zones, &stack).context("resolving burn-scar zones")?)
    } else {
        log::warn!("No zone source configured, skipping zonal statistics");
        None
    };
    if let Some(r) = &resolution {
        log::info!(
            "Zones {:?} via {:?}, {} zoned cells",
            r.zones.zone_ids(),
            r.origin,
            r.zones.zoned_cells()
        );
    }
    let zones = resolution.as_ref().map(|r| &r.zones);

    // 4. Pixel time series.
    let sample = sample_random(&stack, zones, config.sample.size, config.sample.seed);
    log::info!("Sampled {} pixel time series", sample.len());
    sample
        .to_table()
        .write(&out.path(&format!("pixel_sample.{ext}")), config.table_format)?;

    // 5. Zonal means per date.
    let zonal_means = match zones {
        Some(z) => {
            let table = zonal(&stack, z, ZonalStat::Mean)?;
            table
                .to_table()
                .write(&out.path(&format!("zonal_means.{ext}")), config.table_format)?;
            Some(table)
        }
        None => None,
    };

    // 6. Standardized stack.
    let standardized = standardize(&stack);
    write_stack(&out.path("standardized_stack.tif"), &standardized)?;

    // 7. Components of the time series.
    let pca = Pca::fit(&stack, config.pca.use_correlation).context("fitting principal components")?;
    let summary = pca.summary();
    for c in &summary {
        log::info!(
            "{}: sdev {:.4}, {:.1}% of variance ({:.1}% cumulative)",
            c.name,
            c.sdev,
            c.proportion * 100.0,
            c.cumulative * 100.0
        );
    }
    let n = components_to_keep(config.pca.components, pca.ncomponents());
    pca.loadings_table(n)
        .write(&out.path(&format!("pca_loadings.{ext}")), config.table_format)?;

    // 8. Score maps.
    let scores = pca.predict(&stack, n)?;
    write_stack(&out.path("pc_scores.tif"), &scores)?;
    for k in 0..n {
        let png = out.path(&format!("pc{}.png", k + 1));
        write_png(&png, &scores.layer_raster(k), ColorRamp::Diverging)?;
    }

    // 9. Deviation from the zonal means.
    let deviation = match (zones, &zonal_means) {
        (Some(z), Some(means)) => {
            let reference = config
                .deviation_reference
                .map(DeviationReference::Zone)
                .unwrap_or(DeviationReference::OwnZone);
            let dev = zone_deviation(&stack, z, means, reference)?;
            write_stack(&out.path("deviation.tif"), &dev)?;
            Some(dev)
        }
        _ => None,
    };

    let report_path = out.path("report.json");
    let report = WalkthroughReport {
        layers: summarize(&stack),
        extent: stack.extent(),
        rows: stack.rows(),
        cols: stack.cols(),
        sampled_pixels: sample.len(),
        zone_origin: resolution.as_ref().map(|r| r.origin),
        zone_ids: zones.map(|z| z.zone_ids()).unwrap_or_default(),
        deviation_reference: config.deviation_reference,
        components: summary,
        outputs: out.written,
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("writing {}", report_path.display()))?;
    log::info!("Walkthrough finished, {} outputs in {}", report.outputs.len(), config.output_dir.display());

    Ok(WalkthroughResults {
        stack,
        standardized,
        zones: resolution.map(|r| r.zones),
        sample,
        zonal: zonal_means,
        pca,
        scores,
        deviation,
        report,
    })
}

/// Components written out: the configured count, capped at what the fit has.
fn components_to_keep(requested: usize, available: usize) -> usize {
    if requested > available {
        log::warn!(
            "{requested} components requested but the stack only has {available} layers; keeping {available}"
        );
    }
    requested.min(available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_count_is_capped_at_layer_count() {
        assert_eq!(components_to_keep(3, 6), 3);
        assert_eq!(components_to_keep(6, 6), 6);
        assert_eq!(components_to_keep(10, 6), 6);
    }
}
