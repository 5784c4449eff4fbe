use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::Serialize;

use super::AnalysisError;
use super::stats::{LayerStats, Statistic, layer_stats};
use crate::data::model::{LayerInfo, RasterStack};
use crate::data::table::{Column, Table};

/// Variance explained by one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub sdev: f64,
    pub proportion: f64,
    pub cumulative: f64,
}

/// Principal components of a stack, one variable per layer (time slice) and
/// one observation per pixel.
#[derive(Debug, Clone)]
pub struct Pca {
    pub layers: Vec<LayerInfo>,
    pub statistic: Statistic,
    /// Per-layer centre subtracted before projection.
    pub center: Array1<f64>,
    /// Per-layer divisor applied after centring (ones for covariance PCA).
    pub scale: Array1<f64>,
    /// Component variances, decreasing.
    pub variances: Array1<f64>,
    /// `nlayers × ncomponents`; column `k` is component `k`'s loadings.
    pub loadings: Array2<f64>,
    /// Complete cells the matrix was estimated from.
    pub n_obs: usize,
}

pub fn component_name(k: usize) -> String {
    format!("PC{}", k + 1)
}

impl Pca {
    /// Compute covariance (or correlation) over complete cells, then
    /// decompose it.
    pub fn fit(stack: &RasterStack, use_correlation: bool) -> Result<Self, AnalysisError> {
        let statistic = if use_correlation {
            Statistic::Correlation
        } else {
            Statistic::Covariance
        };
        let stats = layer_stats(stack, statistic)?;
        Self::from_stats(&stats, stack.layers.clone())
    }

    /// Decompose a supplied between-layer matrix.
    ///
    /// Components are sorted by decreasing variance; tiny negative
    /// eigenvalues from rounding are clamped to zero. Each component's
    /// largest-magnitude loading is made positive.
    pub fn from_stats(stats: &LayerStats, layers: Vec<LayerInfo>) -> Result<Self, AnalysisError> {
        let p = stats.matrix.nrows();
        if stats.matrix.ncols() != p || layers.len() != p || stats.mean.len() != p {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{}x{} matrix for {} layers",
                p,
                stats.matrix.ncols(),
                layers.len()
            )));
        }
        if stats.matrix.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Decomposition);
        }

        let m = DMatrix::from_fn(p, p, |i, j| stats.matrix[[i, j]]);
        let eig = SymmetricEigen::new(m);

        let mut order: Vec<usize> = (0..p).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let mut variances = Array1::<f64>::zeros(p);
        let mut loadings = Array2::<f64>::zeros((p, p));
        for (k, &src) in order.iter().enumerate() {
            variances[k] = eig.eigenvalues[src].max(0.0);
            let column = eig.eigenvectors.column(src);
            let pivot = column
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for i in 0..p {
                loadings[[i, k]] = sign * column[i];
            }
        }

        let scale = match stats.statistic {
            Statistic::Covariance => Array1::ones(p),
            Statistic::Correlation => stats.sd.clone(),
        };

        Ok(Self {
            layers,
            statistic: stats.statistic,
            center: stats.mean.clone(),
            scale,
            variances,
            loadings,
            n_obs: stats.n,
        })
    }

    pub fn ncomponents(&self) -> usize {
        self.variances.len()
    }

    pub fn sdev(&self) -> Array1<f64> {
        self.variances.mapv(f64::sqrt)
    }

    pub fn loading(&self, k: usize) -> ArrayView1<'_, f64> {
        self.loadings.column(k)
    }

    pub fn summary(&self) -> Vec<ComponentSummary> {
        let total: f64 = self.variances.sum();
        let mut cumulative = 0.0;
        self.variances
            .iter()
            .enumerate()
            .map(|(k, &var)| {
                let proportion = if total > 0.0 { var / total } else { f64::NAN };
                cumulative += proportion;
                ComponentSummary {
                    name: component_name(k),
                    sdev: var.sqrt(),
                    proportion,
                    cumulative,
                }
            })
            .collect()
    }

    fn check_components(&self, n: usize) -> Result<(), AnalysisError> {
        if n == 0 || n > self.ncomponents() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{n} components requested, {} available",
                self.ncomponents()
            )));
        }
        Ok(())
    }

    fn score(&self, px: ArrayView1<'_, f64>, n: usize, out: &mut [f64]) {
        if px.iter().any(|v| !v.is_finite()) {
            out.iter_mut().for_each(|o| *o = f64::NAN);
            return;
        }
        let z = (&px - &self.center) / &self.scale;
        for (k, o) in out.iter_mut().enumerate().take(n) {
            *o = z.dot(&self.loadings.column(k));
        }
    }

    /// Score maps `PC1..PCn`. Pixels missing any layer score `NaN`.
    pub fn predict(&self, stack: &RasterStack, n: usize) -> Result<RasterStack, AnalysisError> {
        self.check_components(n)?;
        if stack.nlayers() != self.layers.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "stack has {} layers, components were fit on {}",
                stack.nlayers(),
                self.layers.len()
            )));
        }

        let (rows, cols) = (stack.rows(), stack.cols());
        let mut data = Array3::<f64>::zeros((n, rows, cols));
        let mut buf = vec![0.0; n];
        for row in 0..rows {
            for col in 0..cols {
                self.score(stack.pixel(row, col), n, &mut buf);
                for (k, v) in buf.iter().enumerate() {
                    data[[k, row, col]] = *v;
                }
            }
        }

        Ok(RasterStack {
            transform: stack.transform,
            layers: (0..n).map(|k| LayerInfo::new(component_name(k), None)).collect(),
            data,
        })
    }

    /// Scores of tabular observations (`nobs × nlayers`).
    pub fn project(&self, values: ArrayView2<'_, f64>, n: usize) -> Result<Array2<f64>, AnalysisError> {
        self.check_components(n)?;
        if values.ncols() != self.layers.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "{} columns, components were fit on {} layers",
                values.ncols(),
                self.layers.len()
            )));
        }
        let mut out = Array2::<f64>::zeros((values.nrows(), n));
        for (obs, mut row) in values.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let slice = row
                .as_slice_mut()
                .ok_or_else(|| AnalysisError::ShapeMismatch("non-contiguous output".into()))?;
            self.score(obs, n, slice);
        }
        Ok(out)
    }

    /// Loadings of the first `n` components against acquisition date.
    pub fn loadings_table(&self, n: usize) -> Table {
        let n = n.min(self.ncomponents());
        let mut columns = vec![
            Column::Text(
                "layer".into(),
                self.layers.iter().map(|l| l.name.clone()).collect(),
            ),
            Column::Text("date".into(), self.layers.iter().map(LayerInfo::label).collect()),
            Column::Float(
                "doy".into(),
                self.layers
                    .iter()
                    .map(|l| l.doy().map(f64::from).unwrap_or(f64::NAN))
                    .collect(),
            ),
        ];
        for k in 0..n {
            columns.push(Column::Float(component_name(k), self.loading(k).to_vec()));
        }
        Table::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::GeoTransform;
    use ndarray::array;

    /// Two layers where the second is twice the first plus a small
    /// orthogonal wobble, so PC1 dominates.
    fn stack() -> RasterStack {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, f64::NAN]];
        let b = array![[2.1, 3.9, 6.1], [7.9, 10.0, 1.0]];
        RasterStack::from_layers(
            GeoTransform::default(),
            vec![(LayerInfo::new("a", None), a), (LayerInfo::new("b", None), b)],
        )
        .unwrap()
    }

    #[test]
    fn components_sorted_and_orthonormal() {
        let pca = Pca::fit(&stack(), false).unwrap();
        assert_eq!(pca.n_obs, 5);
        assert!(pca.variances[0] >= pca.variances[1]);
        let l = &pca.loadings;
        let gram = l.t().dot(l);
        for i in 0..2 {
            for j in 0..2 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expect).abs() < 1e-9);
            }
        }
        // Largest loading of each component is positive.
        assert!(pca.loading(0)[1] > 0.0);
    }

    #[test]
    fn summary_accumulates_to_one() {
        let pca = Pca::fit(&stack(), false).unwrap();
        let s = pca.summary();
        assert_eq!(s[0].name, "PC1");
        assert!(s[0].proportion > 0.99);
        assert!((s[1].cumulative - 1.0).abs() < 1e-12);
    }

    #[test]
    fn total_variance_is_preserved() {
        let st = layer_stats(&stack(), Statistic::Covariance).unwrap();
        let pca = Pca::from_stats(&st, stack().layers).unwrap();
        let trace = st.matrix[[0, 0]] + st.matrix[[1, 1]];
        assert!((pca.variances.sum() - trace).abs() < 1e-9);
    }

    #[test]
    fn scores_are_centred_and_missing_pixels_are_nan() {
        let s = stack();
        let pca = Pca::fit(&s, false).unwrap();
        let scores = pca.predict(&s, 2).unwrap();
        assert_eq!(scores.layers[1].name, "PC2");
        assert!(scores.layer(0)[[1, 2]].is_nan());
        let pc1: f64 = scores.layer(0).iter().filter(|v| v.is_finite()).sum();
        assert!(pc1.abs() < 1e-9);
    }

    #[test]
    fn projection_matches_score_maps() {
        let s = stack();
        let pca = Pca::fit(&s, true).unwrap();
        let maps = pca.predict(&s, 1).unwrap();
        let obs = array![[1.0, 2.1], [5.0, 10.0]];
        let proj = pca.project(obs.view(), 1).unwrap();
        assert!((proj[[0, 0]] - maps.layer(0)[[0, 0]]).abs() < 1e-12);
        assert!((proj[[1, 0]] - maps.layer(0)[[1, 1]]).abs() < 1e-12);
    }

    #[test]
    fn too_many_components_rejected() {
        let s = stack();
        let pca = Pca::fit(&s, false).unwrap();
        assert!(pca.predict(&s, 3).is_err());
        assert!(pca.predict(&s, 0).is_err());
    }

    #[test]
    fn loadings_table_has_component_columns() {
        let pca = Pca::fit(&stack(), false).unwrap();
        let t = pca.loadings_table(5);
        assert_eq!(t.nrows(), 2);
        assert!(t.column("PC2").is_some());
        assert!(t.column("PC3").is_none());
    }
}
