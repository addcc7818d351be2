//! Correlated latent factors through a Cholesky factor.

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use super::primitives::RandomSource;
use super::Result;
use crate::error::GeneratorError;

const SYMMETRY_TOLERANCE: f64 = 1e-8;
const INITIAL_JITTER: f64 = 1e-10;
const MAX_JITTER: f64 = 1.0;

/// Lower-triangular `L` with `L Lᵀ = matrix`, or `None` when the matrix is
/// not positive definite.
pub fn cholesky(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Draws rows of `k` standard-normal factors whose correlation matches a target.
///
/// A target that is only positive semi-definite (or slightly indefinite) is
/// corrected by adding diagonal jitter and renormalising to a unit diagonal;
/// [`LatentFactorModel::effective_correlation`] exposes the corrected matrix.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    names: Vec<String>,
    target: Array2<f64>,
    effective: Array2<f64>,
    factor: Array2<f64>,
}

impl LatentFactorModel {
    pub fn new(names: Vec<String>, correlation: Array2<f64>) -> Result<Self> {
        let k = names.len();
        if correlation.nrows() != k || correlation.ncols() != k {
            return Err(GeneratorError::InvalidCorrelation(format!(
                "expected a {k}x{k} matrix, got {}x{}",
                correlation.nrows(),
                correlation.ncols()
            )));
        }
        for i in 0..k {
            if (correlation[[i, i]] - 1.0).abs() > SYMMETRY_TOLERANCE {
                return Err(GeneratorError::InvalidCorrelation(format!(
                    "diagonal entry {} is {}, expected 1",
                    i,
                    correlation[[i, i]]
                )));
            }
            for j in 0..k {
                let v = correlation[[i, j]];
                if !v.is_finite() || !(-1.0..=1.0).contains(&v) {
                    return Err(GeneratorError::InvalidCorrelation(format!(
                        "entry ({i}, {j}) = {v} is outside [-1, 1]"
                    )));
                }
                if (v - correlation[[j, i]]).abs() > SYMMETRY_TOLERANCE {
                    return Err(GeneratorError::InvalidCorrelation(format!(
                        "matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }

        let mut jitter = 0.0;
        loop {
            let effective = if jitter == 0.0 {
                correlation.clone()
            } else {
                (&correlation + &(Array2::<f64>::eye(k) * jitter)) / (1.0 + jitter)
            };
            if let Some(factor) = cholesky(&effective) {
                if jitter > 0.0 {
                    debug!(jitter, "Correlation matrix corrected to positive definite");
                }
                return Ok(Self {
                    names,
                    target: correlation,
                    effective,
                    factor,
                });
            }
            jitter = if jitter == 0.0 { INITIAL_JITTER } else { jitter * 10.0 };
            if jitter > MAX_JITTER {
                return Err(GeneratorError::InvalidCorrelation(
                    "matrix cannot be corrected to positive definite".to_string(),
                ));
            }
        }
    }

    /// Builds a model from `(left, right, r)` pairs; unspecified pairs are uncorrelated.
    pub fn from_pairs(names: &[&str], pairs: &[(&str, &str, f64)]) -> Result<Self> {
        let k = names.len();
        let mut correlation = Array2::<f64>::eye(k);
        let index = |name: &str| {
            names.iter().position(|n| *n == name).ok_or_else(|| {
                GeneratorError::InvalidCorrelation(format!("unknown factor '{}'", name))
            })
        };
        for (left, right, r) in pairs {
            let (i, j) = (index(left)?, index(right)?);
            correlation[[i, j]] = *r;
            correlation[[j, i]] = *r;
        }
        Self::new(names.iter().map(|n| n.to_string()).collect(), correlation)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn target_correlation(&self) -> &Array2<f64> {
        &self.target
    }

    pub fn effective_correlation(&self) -> &Array2<f64> {
        &self.effective
    }

    /// `n x k` matrix of correlated standard-normal factors.
    pub fn sample(&self, rng: &mut RandomSource, n: usize) -> Array2<f64> {
        let k = self.names.len();
        let z = Array2::from_shape_fn((n, k), |_| rng.standard_normal());
        z.dot(&self.factor.t())
    }

    /// Column `name` of a sampled matrix.
    pub fn column(&self, samples: &Array2<f64>, name: &str) -> Option<Array1<f64>> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(samples.index_axis(Axis(1), i).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::stats;
    use ndarray::array;

    #[test]
    fn test_cholesky_reconstructs() {
        let m = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&m).unwrap();
        let back = l.dot(&l.t());
        for (a, b) in back.iter().zip(m.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn test_sampled_correlation_matches_target() {
        let model = LatentFactorModel::from_pairs(
            &["engagement", "satisfaction", "value"],
            &[("engagement", "satisfaction", 0.6), ("engagement", "value", -0.3)],
        )
        .unwrap();
        let mut rng = RandomSource::new(42);
        let samples = model.sample(&mut rng, 20_000);
        let col = |name| {
            model
                .column(&samples, name)
                .unwrap()
                .iter()
                .map(|v| Some(*v))
                .collect::<Vec<_>>()
        };
        let r_es = stats::pearson(&col("engagement"), &col("satisfaction")).unwrap();
        let r_ev = stats::pearson(&col("engagement"), &col("value")).unwrap();
        let r_sv = stats::pearson(&col("satisfaction"), &col("value")).unwrap();
        assert!((r_es - 0.6).abs() < 0.03);
        assert!((r_ev + 0.3).abs() < 0.03);
        assert!(r_sv.abs() < 0.03);
    }

    #[test]
    fn test_semidefinite_target_is_corrected() {
        // Perfectly correlated factors: PSD but singular.
        let model =
            LatentFactorModel::from_pairs(&["a", "b"], &[("a", "b", 1.0)]).unwrap();
        let effective = model.effective_correlation();
        assert!((effective[[0, 0]] - 1.0).abs() < 1e-12);
        assert!(effective[[0, 1]] > 0.999);
    }

    #[test]
    fn test_invalid_matrices() {
        assert!(LatentFactorModel::new(vec!["a".into()], array![[2.0]]).is_err());
        assert!(LatentFactorModel::new(
            vec!["a".into(), "b".into()],
            array![[1.0, 0.5], [0.2, 1.0]]
        )
        .is_err());
        assert!(LatentFactorModel::from_pairs(&["a"], &[("a", "z", 0.1)]).is_err());
    }
}
