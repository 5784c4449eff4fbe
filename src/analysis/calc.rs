use ndarray::{Array2, Array3, ArrayView1, Axis};

use super::AnalysisError;
use super::stats::{mean_sd, summarize};
use crate::data::model::{LayerInfo, Raster, RasterStack};

/// Apply `f` to every pixel's time series, producing a stack with one layer
/// per entry of `layers`.
pub fn calc<F>(stack: &RasterStack, layers: Vec<LayerInfo>, f: F) -> Result<RasterStack, AnalysisError>
where
    F: Fn(ArrayView1<'_, f64>) -> Vec<f64>,
{
    let (rows, cols) = (stack.rows(), stack.cols());
    let mut data = Array3::<f64>::from_elem((layers.len(), rows, cols), f64::NAN);
    for row in 0..rows {
        for col in 0..cols {
            let out = f(stack.pixel(row, col));
            if out.len() != layers.len() {
                return Err(AnalysisError::CalcArity {
                    expected: layers.len(),
                    got: out.len(),
                });
            }
            for (k, v) in out.into_iter().enumerate() {
                data[[k, row, col]] = v;
            }
        }
    }
    Ok(RasterStack {
        transform: stack.transform,
        layers,
        data,
    })
}

/// Centre and scale each layer by its own mean and standard deviation.
///
/// A layer without spread becomes zeros wherever it is finite.
pub fn standardize(stack: &RasterStack) -> RasterStack {
    let summary = summarize(stack);
    let mut out = stack.clone();
    for (mut layer, s) in out.data.axis_iter_mut(Axis(0)).zip(&summary) {
        let scale = if s.sd.is_finite() && s.sd > 0.0 { s.sd } else { 0.0 };
        layer.mapv_inplace(|v| {
            if !v.is_finite() {
                f64::NAN
            } else if scale > 0.0 {
                (v - s.mean) / scale
            } else {
                0.0
            }
        });
    }
    out
}

/// Per-pixel mean over the finite layers.
pub fn temporal_mean(stack: &RasterStack) -> Raster {
    let data = Array2::from_shape_fn((stack.rows(), stack.cols()), |(r, c)| {
        let finite: Vec<f64> = stack
            .pixel(r, c)
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        mean_sd(&finite).0
    });
    Raster::new(stack.transform, data)
}

/// Each value minus its pixel's temporal mean.
pub fn temporal_anomaly(stack: &RasterStack) -> RasterStack {
    let mean = temporal_mean(stack);
    let mut out = stack.clone();
    for mut layer in out.data.axis_iter_mut(Axis(0)) {
        layer.zip_mut_with(&mean.data, |v, m| *v -= m);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::GeoTransform;
    use ndarray::array;

    fn stack() -> RasterStack {
        RasterStack::from_layers(
            GeoTransform::default(),
            vec![
                (LayerInfo::new("a", None), array![[1.0, 3.0], [f64::NAN, 2.0]]),
                (LayerInfo::new("b", None), array![[5.0, 5.0], [5.0, 5.0]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn calc_maps_each_pixel() {
        let out = calc(
            &stack(),
            vec![LayerInfo::new("range", None)],
            |px| {
                let lo = px.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = px.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                vec![hi - lo]
            },
        )
        .unwrap();
        assert_eq!(out.nlayers(), 1);
        assert_eq!(out.layer(0)[[0, 0]], 4.0);
        assert_eq!(out.layer(0)[[0, 1]], 2.0);
    }

    #[test]
    fn calc_checks_arity() {
        let err = calc(&stack(), vec![LayerInfo::new("x", None)], |_| vec![]).unwrap_err();
        assert!(matches!(err, AnalysisError::CalcArity { expected: 1, got: 0 }));
    }

    #[test]
    fn standardize_centres_and_scales() {
        let out = standardize(&stack());
        // layer a: values 1, 3, 2 -> mean 2, sd 1
        assert_eq!(out.layer(0)[[0, 0]], -1.0);
        assert_eq!(out.layer(0)[[0, 1]], 1.0);
        assert!(out.layer(0)[[1, 0]].is_nan());
        // layer b has no spread
        assert!(out.layer(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn anomaly_removes_pixel_mean() {
        let out = temporal_anomaly(&stack());
        assert_eq!(out.layer(0)[[0, 0]], -2.0);
        assert_eq!(out.layer(1)[[0, 0]], 2.0);
        // Only the finite layer counts towards the mean.
        assert!(out.layer(0)[[1, 0]].is_nan());
        assert_eq!(out.layer(1)[[1, 0]], 0.0);
    }
}
