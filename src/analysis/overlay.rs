use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};

use super::AnalysisError;
use super::zonal::{ZonalStat, ZonalTable};
use crate::data::model::{Raster, RasterStack, ZoneId, ZoneRaster};

/// Which zonal mean a deviation map is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviationReference {
    /// Each cell against the mean of its own zone.
    OwnZone,
    /// Every cell against the mean of one fixed zone.
    Zone(ZoneId),
}

fn same_shape(a: (usize, usize), b: (usize, usize), what: &str) -> Result<(), AnalysisError> {
    if a != b {
        return Err(AnalysisError::ShapeMismatch(format!(
            "{what}: {}x{} vs {}x{}",
            a.0, a.1, b.0, b.1
        )));
    }
    Ok(())
}

/// Combine two rasters cell by cell.
pub fn overlay<F>(a: &Raster, b: &Raster, f: F) -> Result<Raster, AnalysisError>
where
    F: Fn(f64, f64) -> f64,
{
    same_shape(a.data.dim(), b.data.dim(), "overlay")?;
    let data = Zip::from(&a.data).and(&b.data).map_collect(|&x, &y| f(x, y));
    Ok(Raster::new(a.transform, data))
}

/// Combine every layer of a stack with one raster.
pub fn overlay_stack<F>(stack: &RasterStack, raster: &Raster, f: F) -> Result<RasterStack, AnalysisError>
where
    F: Fn(f64, f64) -> f64,
{
    same_shape((stack.rows(), stack.cols()), raster.data.dim(), "overlay")?;
    let mut out = stack.clone();
    for mut layer in out.data.axis_iter_mut(Axis(0)) {
        layer.zip_mut_with(&raster.data, |v, &r| *v = f(*v, r));
    }
    Ok(out)
}

/// Deviation maps: every cell minus a zonal mean for the same date.
///
/// `means` must hold [`ZonalStat::Mean`]. Under
/// [`DeviationReference::OwnZone`] unzoned cells (and zones without a mean)
/// are `NaN`.
pub fn zone_deviation(
    stack: &RasterStack,
    zones: &ZoneRaster,
    means: &ZonalTable,
    reference: DeviationReference,
) -> Result<RasterStack, AnalysisError> {
    if means.stat != ZonalStat::Mean {
        return Err(AnalysisError::NotZonalMeans(means.stat));
    }
    same_shape(
        (stack.rows(), stack.cols()),
        (zones.rows(), zones.cols()),
        "deviation",
    )?;
    if means.layers.len() != stack.nlayers() {
        return Err(AnalysisError::ShapeMismatch(format!(
            "zonal table has {} layers, stack has {}",
            means.layers.len(),
            stack.nlayers()
        )));
    }
    if let DeviationReference::Zone(z) = reference {
        if means.zone_index(z).is_none() {
            return Err(AnalysisError::UnknownZone(z));
        }
    }

    let mut out = stack.clone();
    for (k, mut layer) in out.data.axis_iter_mut(Axis(0)).enumerate() {
        Zip::from(&mut layer).and(&zones.zones).for_each(|v, zone| {
            let target = match reference {
                DeviationReference::OwnZone => zone.and_then(|z| means.get(z, k)),
                DeviationReference::Zone(z) => means.get(z, k),
            };
            *v = match target {
                Some(m) => *v - m,
                None => f64::NAN,
            };
        });
    }
    Ok(out)
}
