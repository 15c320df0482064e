//! Utility functions for rank clustering

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayView2};
use rand::prelude::*;

/// Numerically stable `ln(exp(a) + exp(b))`.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    let (max, min) = if a > b { (a, b) } else { (b, a) };
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + (min - max).exp().ln_1p()
}

/// Choose between a current state of weight `p1` and a proposal of weight
/// `p2`: returns `true` with probability `p2 / (p1 + p2)`.
pub fn accept_proposal<R: Rng + ?Sized>(p1: f64, p2: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() * (p1 + p2) < p2
}

/// Draw an index with probability proportional to `weights`.
///
/// Falls back to the last index with positive weight when rounding leaves
/// the draw past the cumulative sum.
pub fn sample_categorical<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let target = rng.gen::<f64>() * total;

    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (k, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            last_positive = k;
        }
        cumulative += w;
        if target < cumulative {
            return k;
        }
    }
    last_positive
}

/// Most probable cluster of each row of a responsibility matrix.
pub fn map_labels(tik: ArrayView2<f64>) -> Array1<usize> {
    tik.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (k, &value) in row.iter().enumerate() {
                if value > row[best] {
                    best = k;
                }
            }
            best
        })
        .collect()
}

/// Calculate cluster sizes
pub fn cluster_sizes(assignments: &[usize], n_clusters: usize) -> Vec<usize> {
    let mut sizes = vec![0; n_clusters];

    for &cluster_id in assignments.iter() {
        if cluster_id < n_clusters {
            sizes[cluster_id] += 1;
        }
    }

    sizes
}

/// Bayesian Information Criterion `-2 L + k ln(n)`.
pub fn bic(log_likelihood: f64, n_samples: usize, n_parameters: usize) -> f64 {
    -2.0 * log_likelihood + n_parameters as f64 * (n_samples as f64).ln()
}

/// Validate SEM parameters
pub fn validate_parameters(
    n_clusters: usize,
    max_iter: usize,
    burn_in: usize,
    n_gibbs_l: usize,
    burn_l: usize,
    n_init: usize,
) -> Result<()> {
    if n_clusters == 0 {
        return Err(Error::invalid_parameter("n_clusters must be > 0"));
    }

    if max_iter == 0 {
        return Err(Error::invalid_parameter("max_iter must be > 0"));
    }

    if burn_in >= max_iter {
        return Err(Error::invalid_parameter("burn_in must be < max_iter"));
    }

    if burn_l >= n_gibbs_l {
        return Err(Error::invalid_parameter("burn_l must be < n_gibbs_l"));
    }

    if n_init == 0 {
        return Err(Error::invalid_parameter("n_init must be > 0"));
    }

    Ok(())
}

/// Validate per-dimension sweep counts against the data.
pub fn validate_sweeps(name: &str, sweeps: &[usize], n_dims: usize) -> Result<()> {
    if sweeps.len() != n_dims {
        return Err(Error::invalid_parameter(format!(
            "{name} needs one value per dimension ({n_dims}), got {}",
            sweeps.len()
        )));
    }
    if sweeps.iter().any(|&s| s == 0) {
        return Err(Error::invalid_parameter(format!("{name} values must be > 0")));
    }
    Ok(())
}

/// Default number of Gibbs sweeps per dimension: the number of item pairs.
pub fn default_sweeps(modalities: &[usize]) -> Vec<usize> {
    modalities.iter().map(|&m| m * (m - 1) / 2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_log_add_exp() {
        let exact = (2.0f64.exp() + 3.0f64.exp()).ln();
        assert!((log_add_exp(2.0, 3.0) - exact).abs() < 1e-12);
        assert!((log_add_exp(-1000.0, -1000.0) - (-1000.0 + 2.0f64.ln())).abs() < 1e-9);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, 1.5), 1.5);
    }

    #[test]
    fn test_accept_proposal_extremes() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert!(accept_proposal(0.0, 1.0, &mut rng));
            assert!(!accept_proposal(1.0, 0.0, &mut rng));
        }
    }

    #[test]
    fn test_sample_categorical() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(sample_categorical(&[0.0, 1.0, 0.0], &mut rng), 1);
        }

        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            counts[sample_categorical(&[0.25, 0.75], &mut rng)] += 1;
        }
        assert!(counts[1] > 7_000 && counts[1] < 8_000);
    }

    #[test]
    fn test_map_labels() {
        let tik = Array2::from_shape_vec((3, 2), vec![0.9, 0.1, 0.2, 0.8, 0.5, 0.5]).unwrap();
        assert_eq!(map_labels(tik.view()).to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_cluster_sizes() {
        let sizes = cluster_sizes(&[0, 1, 0, 1, 2], 3);
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_bic() {
        let value = bic(-100.0, 100, 3);
        assert!((value - (200.0 + 3.0 * 100f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn test_validate_parameters() {
        assert!(validate_parameters(2, 100, 10, 500, 50, 1).is_ok());
        assert!(validate_parameters(0, 100, 10, 500, 50, 1).is_err());
        assert!(validate_parameters(2, 0, 0, 500, 50, 1).is_err());
        assert!(validate_parameters(2, 10, 10, 500, 50, 1).is_err());
        assert!(validate_parameters(2, 100, 10, 50, 50, 1).is_err());
        assert!(validate_parameters(2, 100, 10, 500, 50, 0).is_err());
    }

    #[test]
    fn test_validate_sweeps() {
        assert!(validate_sweeps("n_gibbs_se", &[6, 3], 2).is_ok());
        assert!(validate_sweeps("n_gibbs_se", &[6], 2).is_err());
        assert!(validate_sweeps("n_gibbs_se", &[6, 0], 2).is_err());
    }

    #[test]
    fn test_default_sweeps() {
        assert_eq!(default_sweeps(&[4, 2, 5]), vec![6, 1, 10]);
    }
}
