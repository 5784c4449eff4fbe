use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array2;
use tempfile::TempDir;

use ndvi_explorer::config::WalkthroughConfig;
use ndvi_explorer::data::RasterError;
use ndvi_explorer::data::loader::read_stack_file;
use ndvi_explorer::data::model::{GeoTransform, Raster};
use ndvi_explorer::data::table::TableFormat;
use ndvi_explorer::data::writer::write_raster;
use ndvi_explorer::data::zones::ZoneOrigin;
use ndvi_explorer::walkthrough;

const ROWS: usize = 12;
const COLS: usize = 16;
const DOYS: [u32; 6] = [129, 145, 161, 177, 193, 209];

fn transform() -> GeoTransform {
    GeoTransform::new(0.0, 12.0, 1.0, 1.0)
}

/// Left half is zone 1, right half zone 2 which burns after the third date.
fn ndvi(row: usize, col: usize, k: usize) -> f64 {
    if row == 5 && col == 5 {
        return f64::NAN;
    }
    let season = 0.3 + 0.08 * k as f64 - 0.012 * (k as f64 - 2.5).powi(2);
    let texture = 0.01 * ((row * 7 + col * 3 + k * 5) % 11) as f64;
    let burn = if col >= 8 && k >= 3 { -0.25 } else { 0.0 };
    season + texture + burn
}

fn write_inputs(dir: &Path) {
    let ndvi_dir = dir.join("ndvi");
    std::fs::create_dir_all(&ndvi_dir).unwrap();
    for (k, doy) in DOYS.iter().enumerate() {
        let data = Array2::from_shape_fn((ROWS, COLS), |(r, c)| ndvi(r, c, k));
        write_raster(
            &ndvi_dir.join(format!("ndvi_2005_{doy:03}.tif")),
            &Raster::new(transform(), data),
        )
        .unwrap();
    }
    // A stray file without a date is skipped.
    write_raster(
        &ndvi_dir.join("mask.tif"),
        &Raster::new(transform(), Array2::zeros((ROWS, COLS))),
    )
    .unwrap();

    let zones = Array2::from_shape_fn((ROWS, COLS), |(_, c)| if c < 8 { 1.0 } else { 2.0 });
    write_raster(&dir.join("zones.tif"), &Raster::new(transform(), zones)).unwrap();

    // Self-intersecting "bowtie" around the burn.
    let geojson = serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "zone": 2 },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[8.0, 0.0], [16.0, 12.0], [16.0, 0.0], [8.0, 12.0], [8.0, 0.0]]]
            }
        }]
    });
    std::fs::write(dir.join("zones.geojson"), geojson.to_string()).unwrap();
}

fn write_config(dir: &Path, with_fallback: bool, format: &str) -> std::path::PathBuf {
    let mut zones = serde_json::json!({ "polygons": "zones.geojson" });
    if with_fallback {
        zones["fallback_raster"] = "zones.tif".into();
    }
    let config = serde_json::json!({
        "stack": { "dir": "ndvi" },
        "crop": { "xmin": 2.0, "xmax": 14.0, "ymin": 1.0, "ymax": 11.0 },
        "zones": zones,
        "sample": { "size": 30, "seed": 7 },
        "pca": { "components": 2 },
        "deviation_reference": 1,
        "output_dir": "out",
        "table_format": format
    });
    let path = dir.join("walkthrough.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

#[test]
fn burn_scar_lesson_runs_end_to_end_with_fallback_zones() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let config = WalkthroughConfig::load(&write_config(tmp.path(), true, "csv")).unwrap();
    assert_eq!(config.table_format, TableFormat::Csv);

    let results = walkthrough::run(&config).unwrap();
    let report = &results.report;

    assert_eq!(report.layers.len(), DOYS.len());
    assert_eq!(
        results.stack.layers[0].date,
        NaiveDate::from_yo_opt(2005, 129)
    );
    assert_eq!((report.rows, report.cols), (10, 12));
    assert_eq!(report.zone_origin, Some(ZoneOrigin::Fallback));
    assert_eq!(report.zone_ids, vec![1, 2]);
    assert_eq!(report.sampled_pixels, 30);
    assert_eq!(report.deviation_reference, Some(1));

    let total: f64 = report.components.iter().map(|c| c.proportion).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(report.components[0].proportion > 0.5);

    // The burned zone drops below the unburned one after the fire.
    let zonal = results.zonal.as_ref().unwrap();
    assert!(zonal.get(2, 4).unwrap() < zonal.get(1, 4).unwrap() - 0.2);
    assert!((zonal.get(2, 0).unwrap() - zonal.get(1, 0).unwrap()).abs() < 0.05);

    // Deviation from zone 1: the burned half is clearly negative late in the season.
    let dev = results.deviation.as_ref().unwrap();
    let zones = results.zones.as_ref().unwrap();
    let (mut sum, mut n) = (0.0, 0);
    for r in 0..dev.rows() {
        for c in 0..dev.cols() {
            let v = dev.data[[5, r, c]];
            if zones.zone_at(r, c) == Some(2) && v.is_finite() {
                sum += v;
                n += 1;
            }
        }
    }
    assert!(n > 0 && sum / (n as f64) < -0.2);

    let out = tmp.path().join("out");
    for name in [
        "cropped_stack.tif",
        "pixel_sample.csv",
        "zonal_means.csv",
        "standardized_stack.tif",
        "pca_loadings.csv",
        "pc_scores.tif",
        "pc1.png",
        "pc2.png",
        "deviation.tif",
        "report.json",
    ] {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert!(report.outputs.iter().all(|p| p.is_file()));

    let scores = read_stack_file(&out.join("pc_scores.tif")).unwrap();
    assert_eq!(scores.nlayers(), 2);
    assert_eq!(scores.layers[0].name, "PC1");
    assert!(scores.data[[0, 4, 3]].is_nan());

    let cropped = read_stack_file(&out.join("cropped_stack.tif")).unwrap();
    assert_eq!(cropped.layers, results.stack.layers);
    assert_eq!(cropped.transform, results.stack.transform);
}

#[test]
fn parquet_tables_are_written_when_requested() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let config = WalkthroughConfig::load(&write_config(tmp.path(), true, "parquet")).unwrap();
    walkthrough::run(&config).unwrap();

    let out = tmp.path().join("out");
    assert!(out.join("pixel_sample.parquet").is_file());
    assert!(out.join("zonal_means.parquet").is_file());
    assert!(out.join("pca_loadings.parquet").is_file());
}

#[test]
fn invalid_polygons_without_fallback_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    write_inputs(tmp.path());
    let config = WalkthroughConfig::load(&write_config(tmp.path(), false, "csv")).unwrap();

    let err = walkthrough::run(&config).unwrap_err();
    match err.downcast_ref::<RasterError>() {
        Some(RasterError::NoZoneFallback(cause)) => {
            assert!(matches!(**cause, RasterError::InvalidGeometry { .. }));
        }
        other => panic!("expected NoZoneFallback, got {other:?}"),
    }
}
