use ndarray::s;

use super::RasterError;
use super::model::{Extent, GeoTransform, Raster, RasterStack, ZoneRaster};

/// Row/column half-open ranges of a sub-grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row0: usize,
    pub row1: usize,
    pub col0: usize,
    pub col1: usize,
}

impl Window {
    pub fn rows(&self) -> usize {
        self.row1 - self.row0
    }

    pub fn cols(&self) -> usize {
        self.col1 - self.col0
    }
}

/// Snap `extent` to the nearest cell edges of a `rows × cols` grid and clamp
/// it to the grid.
pub fn window(
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    extent: &Extent,
) -> Result<Window, RasterError> {
    let empty = || RasterError::EmptyCrop(extent.to_string());
    if !extent.is_valid() || !transform.extent(rows, cols).intersects(extent) {
        return Err(empty());
    }

    let snap = |v: f64, max: usize| -> usize { v.round().clamp(0.0, max as f64) as usize };
    let col0 = snap((extent.xmin - transform.origin_x) / transform.pixel_width, cols);
    let col1 = snap((extent.xmax - transform.origin_x) / transform.pixel_width, cols);
    let row0 = snap((transform.origin_y - extent.ymax) / transform.pixel_height, rows);
    let row1 = snap((transform.origin_y - extent.ymin) / transform.pixel_height, rows);

    if col1 <= col0 || row1 <= row0 {
        return Err(empty());
    }
    Ok(Window {
        row0,
        row1,
        col0,
        col1,
    })
}

pub fn crop_stack(stack: &RasterStack, extent: &Extent) -> Result<RasterStack, RasterError> {
    let w = window(&stack.transform, stack.rows(), stack.cols(), extent)?;
    Ok(RasterStack {
        transform: stack.transform.shifted(w.row0, w.col0),
        layers: stack.layers.clone(),
        data: stack
            .data
            .slice(s![.., w.row0..w.row1, w.col0..w.col1])
            .to_owned(),
    })
}

pub fn crop_raster(raster: &Raster, extent: &Extent) -> Result<Raster, RasterError> {
    let w = window(&raster.transform, raster.rows(), raster.cols(), extent)?;
    Ok(Raster::new(
        raster.transform.shifted(w.row0, w.col0),
        raster.data.slice(s![w.row0..w.row1, w.col0..w.col1]).to_owned(),
    ))
}

pub fn crop_zones(zones: &ZoneRaster, extent: &Extent) -> Result<ZoneRaster, RasterError> {
    let w = window(&zones.transform, zones.rows(), zones.cols(), extent)?;
    Ok(ZoneRaster::new(
        zones.transform.shifted(w.row0, w.col0),
        zones.zones.slice(s![w.row0..w.row1, w.col0..w.col1]).to_owned(),
    ))
}

/// Bring a zone raster onto the stack's grid.
///
/// The zone raster must share the stack's cell lattice and cover the stack;
/// a larger raster is cropped down to the stack's extent.
pub fn align_zones(zones: &ZoneRaster, stack: &RasterStack) -> Result<ZoneRaster, RasterError> {
    let misaligned = |detail: String| RasterError::Misaligned {
        what: "zone raster".to_string(),
        detail,
    };
    if !zones.transform.same_lattice(&stack.transform) {
        return Err(misaligned(format!(
            "{:?} vs stack {:?}",
            zones.transform, stack.transform
        )));
    }

    let aligned = if zones.transform.aligned_with(&stack.transform)
        && zones.rows() == stack.rows()
        && zones.cols() == stack.cols()
    {
        zones.clone()
    } else {
        crop_zones(zones, &stack.extent())?
    };

    if aligned.rows() != stack.rows() || aligned.cols() != stack.cols() {
        return Err(misaligned(format!(
            "covers {}x{} of the stack's {}x{} cells",
            aligned.rows(),
            aligned.cols(),
            stack.rows(),
            stack.cols()
        )));
    }
    Ok(aligned)
}
