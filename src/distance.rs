//! Distances between rankings and between partitions

use crate::combinatorics::order_to_rank;
use crate::isr::MixtureParameters;
use crate::likelihood::Snapshot;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kendall distance: number of discordant pairs between two orderings of the
/// same items.
pub fn kendall_distance(x: &[usize], y: &[usize]) -> usize {
    let m = x.len();
    let xr = order_to_rank(x);
    let yr = order_to_rank(y);

    let mut distance = 0;
    for i in 0..m.saturating_sub(1) {
        for j in (i + 1)..m {
            let dx = xr[i] as i64 - xr[j] as i64;
            let dy = yr[i] as i64 - yr[j] as i64;
            if dx * dy < 0 {
                distance += 1;
            }
        }
    }
    distance
}

/// Rand index between two partitions of the same items.
///
/// Counts every ordered pair `(i, j)`, diagonal included.
pub fn rand_index(z1: &[usize], z2: &[usize]) -> f64 {
    let n = z1.len().min(z2.len());
    if n == 0 {
        return 1.0;
    }

    let mut agree = 0u64;
    let mut disagree = 0u64;
    for i in 0..n {
        for j in 0..n {
            let same1 = z1[i] == z1[j];
            let same2 = z2[i] == z2[j];
            if same1 == same2 {
                agree += 1;
            } else {
                disagree += 1;
            }
        }
    }

    agree as f64 / (agree + disagree) as f64
}

/// Distances between each stored SEM iteration and the final estimate.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IterationDistances {
    /// Rand index between the final partition and each iteration's partition
    pub partition: Vec<f64>,
    /// Squared difference of each proportion, `[iteration][cluster]`
    pub proportion: Vec<Vec<f64>>,
    /// Squared difference of each dispersion, `[iteration][dim][cluster]`
    pub p: Vec<Vec<Vec<f64>>>,
    /// Kendall distance of each reference rank, `[iteration][dim][cluster]`
    pub mu: Vec<Vec<Vec<usize>>>,
    /// Kendall distance of each completed rank, `[iteration][subject][dim]`,
    /// 0 for fully observed ranks
    pub partial_rank: Vec<Vec<Vec<usize>>>,
}

/// Compare every stored snapshot with the final estimate.
///
/// `partial_index[dim]` lists the subjects with a partial ranking and
/// `partial_ranks[dim][k]` their final completion, in the same layout as
/// [`Snapshot::partial_ranks`].
pub fn compute_distances(
    z: &[usize],
    params: &MixtureParameters,
    partial_index: &[Vec<usize>],
    partial_ranks: &[Vec<Vec<usize>>],
    n_samples: usize,
    snapshots: &[Snapshot],
) -> IterationDistances {
    let mut distances = IterationDistances::default();

    for snapshot in snapshots {
        distances.partition.push(rand_index(z, &snapshot.z));

        distances.proportion.push(
            params
                .proportion
                .iter()
                .zip(&snapshot.params.proportion)
                .map(|(a, b)| (a - b).powi(2))
                .collect(),
        );

        distances.p.push(
            params
                .p
                .iter()
                .zip(&snapshot.params.p)
                .map(|(final_dim, dim)| {
                    final_dim
                        .iter()
                        .zip(dim)
                        .map(|(a, b)| (a - b).powi(2))
                        .collect()
                })
                .collect(),
        );

        distances.mu.push(
            params
                .mu
                .iter()
                .zip(&snapshot.params.mu)
                .map(|(final_dim, dim)| {
                    final_dim
                        .iter()
                        .zip(dim)
                        .map(|(a, b)| kendall_distance(a, b))
                        .collect()
                })
                .collect(),
        );

        let mut per_subject = vec![vec![0; partial_index.len()]; n_samples];
        for (dim, subjects) in partial_index.iter().enumerate() {
            for (k, &i) in subjects.iter().enumerate() {
                per_subject[i][dim] =
                    kendall_distance(&partial_ranks[dim][k], &snapshot.partial_ranks[dim][k]);
            }
        }
        distances.partial_rank.push(per_subject);
    }

    distances
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kendall_distance_identity() {
        let x = vec![2, 4, 1, 3];
        assert_eq!(kendall_distance(&x, &x), 0);
    }

    #[test]
    fn test_kendall_distance_reverse() {
        for m in 2..8 {
            let x: Vec<usize> = (1..=m).collect();
            let mut y = x.clone();
            y.reverse();
            assert_eq!(kendall_distance(&x, &y), m * (m - 1) / 2);
        }
    }

    #[test]
    fn test_kendall_distance_one_swap() {
        assert_eq!(kendall_distance(&[1, 2, 3, 4], &[2, 1, 3, 4]), 1);
    }

    #[test]
    fn test_rand_index_identical() {
        let z = vec![0, 0, 1, 2, 1, 2];
        assert_eq!(rand_index(&z, &z), 1.0);
    }

    #[test]
    fn test_rand_index_label_permutation() {
        let z1 = vec![0, 0, 1, 1];
        let z2 = vec![1, 1, 0, 0];
        assert_eq!(rand_index(&z1, &z2), 1.0);
    }

    #[test]
    fn test_rand_index_symmetric() {
        let z1 = vec![0, 0, 1, 1, 2, 0];
        let z2 = vec![0, 1, 1, 1, 0, 0];
        assert_eq!(rand_index(&z1, &z2), rand_index(&z2, &z1));
        assert!(rand_index(&z1, &z2) < 1.0);
    }

    #[test]
    fn test_compute_distances() {
        let params = MixtureParameters {
            mu: vec![vec![vec![1, 2, 3], vec![3, 1, 2]]],
            p: vec![vec![0.9, 0.8]],
            proportion: vec![0.5, 0.5],
        };
        let snapshot = Snapshot {
            z: vec![0, 0, 1],
            params: MixtureParameters {
                mu: vec![vec![vec![2, 1, 3], vec![3, 1, 2]]],
                p: vec![vec![0.7, 0.8]],
                proportion: vec![0.25, 0.75],
            },
            partial_ranks: vec![vec![vec![3, 2, 1]]],
        };

        let distances = compute_distances(
            &[0, 0, 1],
            &params,
            &[vec![2]],
            &[vec![vec![1, 2, 3]]],
            3,
            &[snapshot],
        );

        assert_eq!(distances.partition, vec![1.0]);
        assert!((distances.proportion[0][0] - 0.0625).abs() < 1e-12);
        assert!((distances.p[0][0][0] - 0.04).abs() < 1e-12);
        assert_eq!(distances.mu[0][0], vec![1, 0]);
        assert_eq!(distances.partial_rank[0], vec![vec![0], vec![0], vec![3]]);
    }
}
