//! Writes a synthetic 2005 NDVI season with two burn scars:
//!
//! * `ndvi/ndvi_2005_DDD.tif` – 16-day composites, lakes as no-data
//! * `zones.tif`              – pre-rasterized zones (1 unburned, 2 and 3 scars)
//! * `zones.geojson`          – the same zones as polygons; scar 3 is a
//!                              self-intersecting ring, as in the field data
//! * `walkthrough.json`       – a config for the `walkthrough` binary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;
use serde_json::json;

use ndvi_explorer::config::WalkthroughConfig;
use ndvi_explorer::data::loader::StackSource;
use ndvi_explorer::data::model::{Extent, GeoTransform, Raster};
use ndvi_explorer::data::writer::write_raster;
use ndvi_explorer::data::zones::ZoneSource;
use ndvi_explorer::rng::SimpleRng;

const ROWS: usize = 80;
const COLS: usize = 100;

/// A fire: ellipse centre and radii in cells, and the day it burned.
struct Scar {
    zone: i64,
    row: f64,
    col: f64,
    radius_rows: f64,
    radius_cols: f64,
    burn_doy: u32,
}

const SCARS: [Scar; 2] = [
    Scar {
        zone: 2,
        row: 25.0,
        col: 30.0,
        radius_rows: 12.0,
        radius_cols: 18.0,
        burn_doy: 177,
    },
    Scar {
        zone: 3,
        row: 55.0,
        col: 70.0,
        radius_rows: 10.0,
        radius_cols: 14.0,
        burn_doy: 209,
    },
];

fn in_scar(scar: &Scar, r: usize, c: usize) -> bool {
    let dr = (r as f64 + 0.5 - scar.row) / scar.radius_rows;
    let dc = (c as f64 + 0.5 - scar.col) / scar.radius_cols;
    dr * dr + dc * dc <= 1.0
}

fn is_lake(r: usize, c: usize) -> bool {
    let (dr, dc) = (r as f64 - 68.0, c as f64 - 15.0);
    dr * dr + dc * dc < 36.0
}

/// Boreal green-up: low in spring, peak in late July, senescence in autumn.
fn phenology(doy: u32) -> f64 {
    let t = (doy as f64 - 100.0) / 190.0;
    0.2 + 0.6 * (std::f64::consts::PI * t.clamp(0.0, 1.0)).sin().powf(1.5)
}

fn zone_raster() -> Array2<f64> {
    Array2::from_shape_fn((ROWS, COLS), |(r, c)| {
        SCARS
            .iter()
            .rev()
            .find(|s| in_scar(s, r, c))
            .map(|s| s.zone as f64)
            .unwrap_or(1.0)
    })
}

fn ndvi_layer(doy: u32, rng: &mut SimpleRng) -> Array2<f64> {
    let base = phenology(doy);
    Array2::from_shape_fn((ROWS, COLS), |(r, c)| {
        if is_lake(r, c) {
            return f64::NAN;
        }
        // Gentle east-west gradient in vegetation density.
        let mut v = base * (0.85 + 0.3 * c as f64 / COLS as f64);
        for scar in &SCARS {
            if in_scar(scar, r, c) && doy >= scar.burn_doy {
                let days = (doy - scar.burn_doy) as f64;
                v = 0.12 + 0.002 * days;
            }
        }
        (v + rng.gauss(0.0, 0.02)).clamp(-0.2, 1.0)
    })
}

/// Ring of an ellipse in map coordinates, closed.
fn ellipse_ring(scar: &Scar, gt: &GeoTransform, points: usize) -> Vec<[f64; 2]> {
    let mut ring: Vec<[f64; 2]> = (0..points)
        .map(|i| {
            let a = i as f64 / points as f64 * std::f64::consts::TAU;
            let col = scar.col + scar.radius_cols * a.cos();
            let row = scar.row + scar.radius_rows * a.sin();
            [
                gt.origin_x + col * gt.pixel_width,
                gt.origin_y - row * gt.pixel_height,
            ]
        })
        .collect();
    ring.push(ring[0]);
    ring
}

fn write_polygons(path: &Path, gt: &GeoTransform) -> Result<()> {
    let ext = gt.extent(ROWS, COLS);
    let background = vec![
        [ext.xmin, ext.ymin],
        [ext.xmax, ext.ymin],
        [ext.xmax, ext.ymax],
        [ext.xmin, ext.ymax],
        [ext.xmin, ext.ymin],
    ];
    let valid = ellipse_ring(&SCARS[0], gt, 48);
    // Swap two vertices so the ring crosses itself.
    let mut twisted = ellipse_ring(&SCARS[1], gt, 48);
    twisted.swap(5, 30);

    let feature = |zone: i64, ring: Vec<[f64; 2]>| {
        json!({
            "type": "Feature",
            "properties": { "zone": zone },
            "geometry": { "type": "Polygon", "coordinates": [ring] }
        })
    };
    let doc = json!({
        "type": "FeatureCollection",
        "features": [
            feature(1, background),
            feature(SCARS[0].zone, valid),
            feature(SCARS[1].zone, twisted),
        ]
    });
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("writing {}", path.display()))
}

/// Write a synthetic NDVI season, zones and a walkthrough config.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory the sample data is written to.
    #[arg(default_value = "sample_data")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let out = args.out_dir;
    let ndvi_dir = out.join("ndvi");
    std::fs::create_dir_all(&ndvi_dir).with_context(|| format!("creating {}", ndvi_dir.display()))?;

    // Interior Alaska, roughly 0.01° cells.
    let gt = GeoTransform::new(-147.9, 65.2, 0.01, 0.01);
    let mut rng = SimpleRng::new(2005);

    let days: Vec<u32> = (97..=289).step_by(16).collect();
    for &doy in &days {
        let band = ndvi_layer(doy, &mut rng);
        let path = ndvi_dir.join(format!("ndvi_2005_{doy:03}.tif"));
        write_raster(&path, &Raster::new(gt, band))?;
    }

    write_raster(&out.join("zones.tif"), &Raster::new(gt, zone_raster()))?;
    write_polygons(&out.join("zones.geojson"), &gt)?;

    let config = WalkthroughConfig {
        stack: StackSource::in_dir("ndvi"),
        crop: Some(Extent::new(-147.8, -147.0, 64.5, 65.1)),
        zones: ZoneSource {
            polygons: Some(PathBuf::from("zones.geojson")),
            fallback_raster: Some(PathBuf::from("zones.tif")),
            ..ZoneSource::default()
        },
        deviation_reference: Some(1),
        ..WalkthroughConfig::default()
    };
    std::fs::write(
        out.join("walkthrough.json"),
        serde_json::to_string_pretty(&config)?,
    )?;

    println!(
        "Wrote {} NDVI layers ({ROWS}x{COLS} cells), zones and a walkthrough config to {}",
        days.len(),
        out.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_directory_defaults_to_sample_data() {
        let args = Args::try_parse_from(["generate_sample"]).unwrap();
        assert_eq!(args.out_dir, PathBuf::from("sample_data"));

        let args = Args::try_parse_from(["generate_sample", "/tmp/ndvi"]).unwrap();
        assert_eq!(args.out_dir, PathBuf::from("/tmp/ndvi"));
    }

    #[test]
    fn extra_arguments_are_rejected() {
        assert!(Args::try_parse_from(["generate_sample", "a", "b"]).is_err());
    }
}
