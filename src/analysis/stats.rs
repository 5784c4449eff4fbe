use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use super::AnalysisError;
use crate::data::model::RasterStack;

// ---------------------------------------------------------------------------
// Per-layer summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sd: f64,
    pub na_count: usize,
}

/// Min, max, mean and sample standard deviation of every layer over its
/// finite cells.
pub fn summarize(stack: &RasterStack) -> Vec<LayerSummary> {
    stack
        .layers
        .iter()
        .enumerate()
        .map(|(i, info)| {
            let layer = stack.layer(i);
            let finite: Vec<f64> = layer.iter().copied().filter(|v| v.is_finite()).collect();
            let (mean, sd) = mean_sd(&finite);
            let (min, max) = finite
                .iter()
                .fold((f64::NAN, f64::NAN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            LayerSummary {
                name: info.name.clone(),
                date: info.date,
                min,
                max,
                mean,
                sd,
                na_count: layer.len() - finite.len(),
            }
        })
        .collect()
}

/// Mean and sample standard deviation; `NaN` where undefined.
pub(crate) fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, f64::NAN);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1) as f64).sqrt())
}

// ---------------------------------------------------------------------------
// Between-layer statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Statistic {
    Covariance,
    Correlation,
}

/// Between-layer matrix over complete cases.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStats {
    pub statistic: Statistic,
    /// `nlayers × nlayers`, symmetric.
    pub matrix: Array2<f64>,
    /// Per-layer mean over the complete cases.
    pub mean: Array1<f64>,
    /// Per-layer sample standard deviation over the complete cases.
    pub sd: Array1<f64>,
    /// Number of complete cases used.
    pub n: usize,
}

/// Covariance or correlation between layers, using only cells finite in
/// every layer, with an `n - 1` denominator.
pub fn layer_stats(stack: &RasterStack, statistic: Statistic) -> Result<LayerStats, AnalysisError> {
    let cases = complete_cases(stack);
    let n = cases.nrows();
    if n < 2 {
        return Err(AnalysisError::InsufficientData {
            needed: 2,
            found: n,
        });
    }

    let mean = cases
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::InsufficientData { needed: 2, found: 0 })?;
    let centered = &cases - &mean;
    let cov = centered.t().dot(&centered) / (n - 1) as f64;
    let sd = cov.diag().mapv(f64::sqrt);

    let matrix = match statistic {
        Statistic::Covariance => cov,
        Statistic::Correlation => {
            let mut cor = cov.clone();
            for ((i, j), v) in cor.indexed_iter_mut() {
                let denom = sd[i] * sd[j];
                *v = if denom > 0.0 { *v / denom } else { f64::NAN };
            }
            cor
        }
    };

    Ok(LayerStats {
        statistic,
        matrix,
        mean,
        sd,
        n,
    })
}

/// Rows of pixel series (`ncomplete × nlayers`) finite in every layer.
pub fn complete_cases(stack: &RasterStack) -> Array2<f64> {
    let nl = stack.nlayers();
    let mut flat = Vec::new();
    let mut n = 0;
    for row in 0..stack.rows() {
        for col in 0..stack.cols() {
            let px = stack.pixel(row, col);
            if px.iter().all(|v| v.is_finite()) {
                flat.extend(px.iter().copied());
                n += 1;
            }
        }
    }
    Array2::from_shape_vec((n, nl), flat).unwrap_or_else(|_| Array2::zeros((0, nl)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{GeoTransform, LayerInfo};
    use ndarray::array;

    fn stack() -> RasterStack {
        RasterStack::from_layers(
            GeoTransform::default(),
            vec![
                (LayerInfo::new("a", None), array![[1.0, 2.0], [3.0, f64::NAN]]),
                (LayerInfo::new("b", None), array![[2.0, 4.0], [6.0, 100.0]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn summary_ignores_missing_cells() {
        let s = summarize(&stack());
        assert_eq!(s[0].min, 1.0);
        assert_eq!(s[0].max, 3.0);
        assert_eq!(s[0].mean, 2.0);
        assert_eq!(s[0].sd, 1.0);
        assert_eq!(s[0].na_count, 1);
        assert_eq!(s[1].max, 100.0);
    }

    #[test]
    fn all_missing_layer_reports_nan() {
        let stack = RasterStack::from_layers(
            GeoTransform::default(),
            vec![(LayerInfo::new("a", None), array![[f64::NAN]])],
        )
        .unwrap();
        let s = summarize(&stack);
        assert!(s[0].min.is_nan() && s[0].mean.is_nan());
        assert_eq!(s[0].na_count, 1);
    }

    #[test]
    fn covariance_uses_complete_cases_only() {
        let st = layer_stats(&stack(), Statistic::Covariance).unwrap();
        assert_eq!(st.n, 3);
        // a = [1, 2, 3], b = 2a
        assert_eq!(st.mean.to_vec(), vec![2.0, 4.0]);
        assert!((st.matrix[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((st.matrix[[0, 1]] - 2.0).abs() < 1e-12);
        assert!((st.matrix[[1, 1]] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_of_linear_layers_is_one() {
        let st = layer_stats(&stack(), Statistic::Correlation).unwrap();
        assert!((st.matrix[[0, 1]] - 1.0).abs() < 1e-12);
        assert!((st.matrix[[1, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn too_few_complete_cells() {
        let stack = RasterStack::from_layers(
            GeoTransform::default(),
            vec![(LayerInfo::new("a", None), array![[1.0, f64::NAN]])],
        )
        .unwrap();
        let err = layer_stats(&stack, Statistic::Covariance).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { found: 1, .. }));
    }
}
