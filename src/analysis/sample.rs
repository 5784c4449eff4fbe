use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::data::model::{LayerInfo, RasterStack, ZoneId, ZoneRaster};
use crate::data::table::{Column, Table};
use crate::rng::SimpleRng;

/// One sampled pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampledCell {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    pub zone: Option<ZoneId>,
}

/// Time series of randomly drawn pixels, one row per pixel.
#[derive(Debug, Clone)]
pub struct PixelSample {
    pub cells: Vec<SampledCell>,
    pub layers: Vec<LayerInfo>,
    /// `cells.len() × layers.len()`
    pub values: Array2<f64>,
}

impl PixelSample {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Long-format table: one row per pixel and date.
    pub fn to_table(&self) -> Table {
        let n = self.cells.len() * self.layers.len();
        let mut pixel = Vec::with_capacity(n);
        let mut row = Vec::with_capacity(n);
        let mut col = Vec::with_capacity(n);
        let mut zone = Vec::with_capacity(n);
        let mut date = Vec::with_capacity(n);
        let mut doy = Vec::with_capacity(n);
        let mut ndvi = Vec::with_capacity(n);

        for (i, cell) in self.cells.iter().enumerate() {
            for (k, layer) in self.layers.iter().enumerate() {
                pixel.push(i as i64);
                row.push(cell.row as i64);
                col.push(cell.col as i64);
                zone.push(cell.zone.unwrap_or(0));
                date.push(layer.label());
                doy.push(layer.doy().map(f64::from).unwrap_or(f64::NAN));
                ndvi.push(self.values[[i, k]]);
            }
        }

        Table::new(vec![
            Column::Int("pixel".into(), pixel),
            Column::Int("row".into(), row),
            Column::Int("col".into(), col),
            Column::Int("zone".into(), zone),
            Column::Text("date".into(), date),
            Column::Float("doy".into(), doy),
            Column::Float("value".into(), ndvi),
        ])
    }
}

/// Draw up to `size` distinct pixels whose series is finite in every layer.
///
/// The draw is a partial Fisher-Yates shuffle of the eligible cells, so the
/// same seed reproduces the same sample. When fewer cells qualify, all of
/// them are returned.
pub fn sample_random(
    stack: &RasterStack,
    zones: Option<&ZoneRaster>,
    size: usize,
    seed: u64,
) -> PixelSample {
    let mut eligible: Vec<(usize, usize)> = (0..stack.rows())
        .flat_map(|r| (0..stack.cols()).map(move |c| (r, c)))
        .filter(|&(r, c)| stack.is_complete(r, c))
        .collect();

    let take = size.min(eligible.len());
    let mut rng = SimpleRng::new(seed);
    for i in 0..take {
        let j = i + rng.below(eligible.len() - i);
        eligible.swap(i, j);
    }
    eligible.truncate(take);

    let nl = stack.nlayers();
    let mut values = Array2::<f64>::zeros((take, nl));
    let cells = eligible
        .into_iter()
        .enumerate()
        .map(|(i, (row, col))| {
            values.row_mut(i).assign(&stack.pixel(row, col));
            let (x, y) = stack.transform.cell_center(row, col);
            SampledCell {
                row,
                col,
                x,
                y,
                zone: zones.and_then(|z| z.zone_at(row, col)),
            }
        })
        .collect();

    log::debug!("Sampled {take} of the requested {size} pixels");
    PixelSample {
        cells,
        layers: stack.layers.clone(),
        values,
    }
}

/// Time series at map coordinate `(x, y)`, if it falls on the grid.
pub fn extract_xy(stack: &RasterStack, x: f64, y: f64) -> Option<Array1<f64>> {
    let (row, col) = stack
        .transform
        .cell_at(x, y, stack.rows(), stack.cols())?;
    Some(stack.pixel(row, col).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::GeoTransform;
    use ndarray::array;
    use std::collections::BTreeSet;

    fn stack() -> RasterStack {
        let a = Array2::from_shape_fn((5, 5), |(r, c)| (r * 5 + c) as f64);
        let mut b = a.mapv(|v| v * 10.0);
        b[[0, 0]] = f64::NAN;
        RasterStack::from_layers(
            GeoTransform::new(0.0, 5.0, 1.0, 1.0),
            vec![(LayerInfo::new("a", None), a), (LayerInfo::new("b", None), b)],
        )
        .unwrap()
    }

    #[test]
    fn sample_is_distinct_complete_and_reproducible() {
        let s1 = sample_random(&stack(), None, 10, 42);
        let s2 = sample_random(&stack(), None, 10, 42);
        assert_eq!(s1.cells, s2.cells);
        assert_eq!(s1.len(), 10);

        let distinct: BTreeSet<_> = s1.cells.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(distinct.len(), 10);
        assert!(!distinct.contains(&(0, 0)));
        for (i, c) in s1.cells.iter().enumerate() {
            assert_eq!(s1.values[[i, 1]], 10.0 * s1.values[[i, 0]]);
            assert_eq!(s1.values[[i, 0]], (c.row * 5 + c.col) as f64);
        }
    }

    #[test]
    fn oversized_request_returns_every_valid_cell() {
        let s = sample_random(&stack(), None, 1000, 1);
        assert_eq!(s.len(), 24);
    }

    #[test]
    fn sample_carries_zone_ids() {
        let zones = ZoneRaster::new(
            GeoTransform::new(0.0, 5.0, 1.0, 1.0),
            Array2::from_shape_fn((5, 5), |(r, _)| if r < 2 { Some(1) } else { None }),
        );
        let s = sample_random(&stack(), Some(&zones), 24, 3);
        for c in &s.cells {
            assert_eq!(c.zone, if c.row < 2 { Some(1) } else { None });
        }
    }

    #[test]
    fn long_table_has_row_per_pixel_and_date() {
        let s = sample_random(&stack(), None, 3, 9);
        let t = s.to_table();
        assert_eq!(t.nrows(), 6);
        assert!(t.column("value").is_some());
    }

    #[test]
    fn extract_by_coordinate() {
        let px = extract_xy(&stack(), 1.5, 4.5).unwrap();
        assert_eq!(px, array![1.0, 10.0]);
        assert!(extract_xy(&stack(), -1.0, 4.5).is_none());
    }
}
