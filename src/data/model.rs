use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

use super::RasterError;

/// Identifier of a burn-scar zone (a polygon id or a zone raster value).
pub type ZoneId = i64;

// ---------------------------------------------------------------------------
// GeoTransform / Extent – where a grid sits on the map
// ---------------------------------------------------------------------------

/// North-up affine grid. `origin_*` is the outer corner of the upper-left
/// cell; rows grow southwards, so `pixel_height` is positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
        }
    }
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    pub fn extent(&self, rows: usize, cols: usize) -> Extent {
        Extent {
            xmin: self.origin_x,
            xmax: self.origin_x + cols as f64 * self.pixel_width,
            ymin: self.origin_y - rows as f64 * self.pixel_height,
            ymax: self.origin_y,
        }
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Cell containing map coordinate `(x, y)` in a `rows × cols` grid.
    pub fn cell_at(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let c = ((x - self.origin_x) / self.pixel_width).floor();
        let r = ((self.origin_y - y) / self.pixel_height).floor();
        if c < 0.0 || r < 0.0 || c >= cols as f64 || r >= rows as f64 {
            return None;
        }
        Some((r as usize, c as usize))
    }

    /// Transform of the sub-grid starting at `(row, col)`.
    pub fn shifted(&self, row: usize, col: usize) -> GeoTransform {
        GeoTransform {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y - row as f64 * self.pixel_height,
            ..*self
        }
    }

    /// Same cell size and origin within a millionth of a cell.
    pub fn aligned_with(&self, other: &GeoTransform) -> bool {
        let tol_x = self.pixel_width.abs() * 1e-6;
        let tol_y = self.pixel_height.abs() * 1e-6;
        (self.pixel_width - other.pixel_width).abs() <= tol_x
            && (self.pixel_height - other.pixel_height).abs() <= tol_y
            && (self.origin_x - other.origin_x).abs() <= tol_x
            && (self.origin_y - other.origin_y).abs() <= tol_y
    }

    /// Same cell size, and origins an integer number of cells apart.
    pub fn same_lattice(&self, other: &GeoTransform) -> bool {
        let frac = |d: f64, size: f64| {
            let cells = d / size;
            (cells - cells.round()).abs() <= 1e-6
        };
        (self.pixel_width - other.pixel_width).abs() <= self.pixel_width.abs() * 1e-6
            && (self.pixel_height - other.pixel_height).abs() <= self.pixel_height.abs() * 1e-6
            && frac(self.origin_x - other.origin_x, self.pixel_width)
            && frac(self.origin_y - other.origin_y, self.pixel_height)
    }
}

/// Axis-aligned bounding box in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn is_valid(&self) -> bool {
        self.xmin < self.xmax && self.ymin < self.ymax
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.xmin < other.xmax
            && other.xmin < self.xmax
            && self.ymin < other.ymax
            && other.ymin < self.ymax
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        if !self.intersects(other) {
            return None;
        }
        Some(Extent {
            xmin: self.xmin.max(other.xmin),
            xmax: self.xmax.min(other.xmax),
            ymin: self.ymin.max(other.ymin),
            ymax: self.ymax.min(other.ymax),
        })
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}] x [{:.2}, {:.2}]",
            self.xmin, self.xmax, self.ymin, self.ymax
        )
    }
}

// ---------------------------------------------------------------------------
// LayerInfo – one time slice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub date: Option<NaiveDate>,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>, date: Option<NaiveDate>) -> Self {
        Self {
            name: name.into(),
            date,
        }
    }

    /// Day of year of the acquisition, if dated.
    pub fn doy(&self) -> Option<u32> {
        self.date.map(|d| d.ordinal())
    }

    /// Label used in tables and legends: the date when known.
    pub fn label(&self) -> String {
        match self.date {
            Some(d) => d.format("%Y-%m-%d").to_string(),
            None => self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raster – a single band
// ---------------------------------------------------------------------------

/// Single-band grid. `NaN` marks missing cells.
#[derive(Debug, Clone)]
pub struct Raster {
    pub transform: GeoTransform,
    pub data: Array2<f64>,
}

impl Raster {
    pub fn new(transform: GeoTransform, data: Array2<f64>) -> Self {
        Self { transform, data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn extent(&self) -> Extent {
        self.transform.extent(self.rows(), self.cols())
    }

    /// Finite minimum and maximum, `None` when every cell is missing.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        finite_range(self.data.iter().copied())
    }
}

pub(crate) fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

// ---------------------------------------------------------------------------
// RasterStack – the time series
// ---------------------------------------------------------------------------

/// Same-grid layers ordered by acquisition, stored layer-major
/// `(layer, row, col)`.
#[derive(Debug, Clone)]
pub struct RasterStack {
    pub transform: GeoTransform,
    pub layers: Vec<LayerInfo>,
    pub data: Array3<f64>,
}

impl RasterStack {
    /// Stack equally shaped layers.
    pub fn from_layers(
        transform: GeoTransform,
        layers: Vec<(LayerInfo, Array2<f64>)>,
    ) -> Result<Self, RasterError> {
        let (rows, cols) = layers.first().map(|(_, a)| a.dim()).unwrap_or((0, 0));
        let mut data = Array3::<f64>::zeros((layers.len(), rows, cols));
        let mut infos = Vec::with_capacity(layers.len());
        for (i, (info, band)) in layers.into_iter().enumerate() {
            if band.dim() != (rows, cols) {
                return Err(RasterError::Misaligned {
                    what: format!("layer '{}'", info.name),
                    detail: format!("{:?} cells, expected {:?}", band.dim(), (rows, cols)),
                });
            }
            data.index_axis_mut(Axis(0), i).assign(&band);
            infos.push(info);
        }
        Ok(Self {
            transform,
            layers: infos,
            data,
        })
    }

    pub fn nlayers(&self) -> usize {
        self.layers.len()
    }

    pub fn rows(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn cols(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn ncells(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn extent(&self) -> Extent {
        self.transform.extent(self.rows(), self.cols())
    }

    pub fn layer(&self, i: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), i)
    }

    /// Layer `i` as an owned single-band raster.
    pub fn layer_raster(&self, i: usize) -> Raster {
        Raster::new(self.transform, self.layer(i).to_owned())
    }

    /// Time series of one pixel.
    pub fn pixel(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.data.slice(s![.., row, col])
    }

    /// Whether every layer of the pixel holds a finite value.
    pub fn is_complete(&self, row: usize, col: usize) -> bool {
        self.pixel(row, col).iter().all(|v| v.is_finite())
    }

    pub fn dates(&self) -> Vec<Option<NaiveDate>> {
        self.layers.iter().map(|l| l.date).collect()
    }
}

// ---------------------------------------------------------------------------
// ZoneRaster – categorical burn-scar zones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ZoneRaster {
    pub transform: GeoTransform,
    pub zones: Array2<Option<ZoneId>>,
}

impl ZoneRaster {
    pub fn new(transform: GeoTransform, zones: Array2<Option<ZoneId>>) -> Self {
        Self { transform, zones }
    }

    pub fn rows(&self) -> usize {
        self.zones.nrows()
    }

    pub fn cols(&self) -> usize {
        self.zones.ncols()
    }

    pub fn extent(&self) -> Extent {
        self.transform.extent(self.rows(), self.cols())
    }

    pub fn zone_at(&self, row: usize, col: usize) -> Option<ZoneId> {
        self.zones.get((row, col)).copied().flatten()
    }

    /// Sorted distinct zone ids.
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        self.zones
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of cells assigned to any zone.
    pub fn zoned_cells(&self) -> usize {
        self.zones.iter().filter(|z| z.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid() -> GeoTransform {
        GeoTransform::new(100.0, 500.0, 10.0, 10.0)
    }

    #[test]
    fn extent_and_cell_lookup() {
        let gt = grid();
        let ext = gt.extent(4, 3);
        assert_eq!(ext, Extent::new(100.0, 130.0, 460.0, 500.0));
        assert_eq!(gt.cell_center(0, 0), (105.0, 495.0));
        assert_eq!(gt.cell_at(105.0, 495.0, 4, 3), Some((0, 0)));
        assert_eq!(gt.cell_at(129.9, 460.1, 4, 3), Some((3, 2)));
        assert_eq!(gt.cell_at(131.0, 470.0, 4, 3), None);
    }

    #[test]
    fn lattice_checks() {
        let gt = grid();
        assert!(gt.aligned_with(&gt.shifted(0, 0)));
        assert!(!gt.aligned_with(&gt.shifted(1, 2)));
        assert!(gt.same_lattice(&gt.shifted(1, 2)));
        let off = GeoTransform::new(103.0, 500.0, 10.0, 10.0);
        assert!(!gt.same_lattice(&off));
    }

    #[test]
    fn stack_rejects_mismatched_layers() {
        let a = (LayerInfo::new("a", None), Array2::<f64>::zeros((2, 2)));
        let b = (LayerInfo::new("b", None), Array2::<f64>::zeros((3, 2)));
        let err = RasterStack::from_layers(grid(), vec![a, b]).unwrap_err();
        assert!(matches!(err, RasterError::Misaligned { .. }));
    }

    #[test]
    fn stack_pixel_series() {
        let a = (LayerInfo::new("a", None), array![[1.0, 2.0], [3.0, 4.0]]);
        let b = (LayerInfo::new("b", None), array![[5.0, f64::NAN], [7.0, 8.0]]);
        let stack = RasterStack::from_layers(grid(), vec![a, b]).unwrap();
        assert_eq!(stack.nlayers(), 2);
        assert_eq!(stack.pixel(1, 0).to_vec(), vec![3.0, 7.0]);
        assert!(stack.is_complete(0, 0));
        assert!(!stack.is_complete(0, 1));
    }

    #[test]
    fn zone_ids_sorted_and_distinct() {
        let zr = ZoneRaster::new(grid(), array![[Some(3), None], [Some(1), Some(3)]]);
        assert_eq!(zr.zone_ids(), vec![1, 3]);
        assert_eq!(zr.zoned_cells(), 3);
    }

    #[test]
    fn layer_label_prefers_date() {
        let d = NaiveDate::from_ymd_opt(2005, 5, 9).unwrap();
        assert_eq!(LayerInfo::new("ndvi_2005_129", Some(d)).label(), "2005-05-09");
        assert_eq!(LayerInfo::new("ndvi_2005_129", Some(d)).doy(), Some(129));
        assert_eq!(LayerInfo::new("x", None).label(), "x");
    }
}
