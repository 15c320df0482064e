//! Gibbs samplers of the SEM algorithm
//!
//! Every sampler moves by adjacent transpositions and chooses between the
//! current state and the proposal with probability proportional to their
//! ISR probabilities.

use crate::combinatorics::{rank_to_index, tab_factorial};
use crate::data::PartialRank;
use crate::initialization::random_permutation;
use crate::isr::{comparison, proba_cond};
use crate::utils::{accept_proposal, log_add_exp};
use rand::prelude::*;
use std::collections::HashMap;

/// Resample the presentation order of every subject of one dimension.
///
/// `mu` and `p` are the per-cluster parameters of the dimension and `z` the
/// current labels. Each chain starts from a uniform random order.
pub fn gibbs_y<R: Rng + ?Sized>(
    ranks: &mut [PartialRank],
    mu: &[Vec<usize>],
    p: &[f64],
    z: &[usize],
    n_sweeps: usize,
    rng: &mut R,
) {
    for (rank, &k) in ranks.iter_mut().zip(z.iter()) {
        let m = rank.len();
        let mut y = random_permutation(m, rng);
        let mut p1 = proba_cond(&rank.rank, &y, &mu[k], p[k]);

        for _ in 0..n_sweeps {
            for pos in 0..m - 1 {
                y.swap(pos, pos + 1);
                let p2 = proba_cond(&rank.rank, &y, &mu[k], p[k]);

                if accept_proposal(p1, p2, rng) {
                    p1 = p2;
                } else {
                    y.swap(pos, pos + 1);
                }
            }
        }

        rank.y = y;
    }
}

/// Resample the unobserved positions of every partial ranking of one
/// dimension. Only items sitting at two consecutive unresolved positions are
/// exchanged, so observed positions never move.
pub fn gibbs_x<R: Rng + ?Sized>(
    ranks: &mut [PartialRank],
    mu: &[Vec<usize>],
    p: &[f64],
    z: &[usize],
    n_sweeps: usize,
    rng: &mut R,
) {
    for (rank, &k) in ranks.iter_mut().zip(z.iter()) {
        if !rank.is_partial || rank.missing_index.len() < 2 {
            continue;
        }

        let mut p1 = proba_cond(&rank.rank, &rank.y, &mu[k], p[k]);

        for _ in 0..n_sweeps {
            for pair in rank.missing_index.windows(2) {
                rank.rank.swap(pair[0], pair[1]);
                let p2 = proba_cond(&rank.rank, &rank.y, &mu[k], p[k]);

                if accept_proposal(p1, p2, rng) {
                    p1 = p2;
                } else {
                    rank.rank.swap(pair[0], pair[1]);
                }
            }
        }
    }
}

/// Outcome of [`simu_m`] for one (dimension, cluster).
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceUpdate {
    /// Selected reference ordering
    pub mu: Vec<usize>,
    /// Maximum likelihood dispersion for `mu`
    pub p: f64,
    /// Completed-data log-likelihood of `(mu, p)`
    pub log_likelihood: f64,
}

/// Maximum likelihood dispersion `G / A` of the given subjects for `mu`, and
/// the matching completed-data log-likelihood.
///
/// A dispersion of exactly 0 or 1 gives a log-likelihood of 0 when it
/// explains every comparison and `f64::MIN` otherwise.
pub fn complete_log_likelihood(members: &[&PartialRank], mu: &[usize]) -> (f64, f64) {
    let mut agreements = 0.0;
    let mut disagreements = 0.0;
    for rank in members {
        let counts = comparison(&rank.rank, &rank.y, mu);
        agreements += counts.agreements as f64;
        disagreements += counts.disagreements() as f64;
    }

    let total = agreements + disagreements;
    if total == 0.0 {
        return (1.0, 0.0);
    }

    let p = agreements / total;
    let log_likelihood = if p != 0.0 && p != 1.0 {
        agreements * p.ln() + disagreements * (1.0 - p).ln()
    } else if (p == 0.0 && agreements == 0.0) || (p == 1.0 && disagreements == 0.0) {
        0.0
    } else {
        f64::MIN
    };

    (p, log_likelihood)
}

/// Update the reference ordering and dispersion of one cluster in one
/// dimension.
///
/// Runs `n_sweeps` sweeps of adjacent transpositions of `mu`, accepting a move
/// with probability `P(mu') / (P(mu) + P(mu'))` where `P` is the product of
/// the ISR probabilities of the cluster's subjects. The ordering reached at
/// the end of each sweep is scored once by [`complete_log_likelihood`]; the
/// best scored ordering is returned.
pub fn simu_m<R: Rng + ?Sized>(
    ranks: &[PartialRank],
    z: &[usize],
    cluster: usize,
    mu: &[usize],
    p: f64,
    n_sweeps: usize,
    rng: &mut R,
) -> ReferenceUpdate {
    let m = mu.len();
    let tab = tab_factorial(m);
    let members: Vec<&PartialRank> = ranks
        .iter()
        .zip(z.iter())
        .filter(|(_, &k)| k == cluster)
        .map(|(rank, _)| rank)
        .collect();

    let log_proba = |mu: &[usize], p: f64| -> f64 {
        members
            .iter()
            .map(|rank| proba_cond(&rank.rank, &rank.y, mu, p).ln())
            .sum()
    };

    let mut current = mu.to_vec();
    let mut current_p = p;
    let mut lnp1 = log_proba(&current, current_p);

    let mut visited: HashMap<u64, (f64, f64)> = HashMap::new();
    let mut best = ReferenceUpdate {
        mu: current.clone(),
        p: current_p,
        log_likelihood: f64::NEG_INFINITY,
    };

    for _ in 0..n_sweeps {
        for pos in 0..m - 1 {
            current.swap(pos, pos + 1);
            let lnp2 = log_proba(&current, current_p);

            let normalizer = log_add_exp(lnp1, lnp2);
            let accept = if normalizer == f64::NEG_INFINITY {
                rng.gen_bool(0.5)
            } else {
                rng.gen::<f64>() < (lnp2 - normalizer).exp()
            };

            if accept {
                lnp1 = lnp2;
            } else {
                current.swap(pos, pos + 1);
            }
        }

        let index = rank_to_index(&current, &tab);
        let (p_hat, log_likelihood) = *visited
            .entry(index)
            .or_insert_with(|| complete_log_likelihood(&members, &current));

        if log_likelihood > best.log_likelihood {
            best = ReferenceUpdate {
                mu: current.clone(),
                p: p_hat,
                log_likelihood,
            };
        }

        if p_hat != current_p {
            current_p = p_hat;
            lnp1 = log_proba(&current, current_p);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isr::sample_isr;

    fn complete(rank: &[usize], rng: &mut StdRng) -> PartialRank {
        let mut partial = PartialRank::from_observed(rank).unwrap();
        partial.y = random_permutation(rank.len(), rng);
        partial
    }

    #[test]
    fn test_gibbs_y_keeps_permutations() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut ranks: Vec<PartialRank> = (0..10)
            .map(|_| {
                let x = sample_isr(&[1, 2, 3, 4, 5], 0.8, &mut rng);
                complete(&x, &mut rng)
            })
            .collect();
        let z = vec![0; 10];

        gibbs_y(&mut ranks, &[vec![1, 2, 3, 4, 5]], &[0.8], &z, 10, &mut rng);

        for rank in &ranks {
            let mut y = rank.y.clone();
            y.sort_unstable();
            assert_eq!(y, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_gibbs_x_leaves_full_ranks_untouched() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut ranks = vec![complete(&[2, 1, 4, 3], &mut rng)];
        let before = ranks[0].clone();

        gibbs_x(&mut ranks, &[vec![1, 2, 3, 4]], &[0.7], &[0], 50, &mut rng);

        assert_eq!(ranks[0], before);
    }

    #[test]
    fn test_gibbs_x_single_missing_position_is_fixed() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut partial = PartialRank::from_observed(&[2, 0, 4, 3]).unwrap();
        partial.rank[1] = 1;
        partial.y = random_permutation(4, &mut rng);
        let mut ranks = vec![partial];

        gibbs_x(&mut ranks, &[vec![1, 2, 3, 4]], &[0.7], &[0], 50, &mut rng);

        assert_eq!(ranks[0].rank, vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_gibbs_x_moves_only_missing_positions() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut partial = PartialRank::from_observed(&[0, 5, 0, 0, 1]).unwrap();
        partial.rank = vec![2, 5, 3, 4, 1];
        partial.y = random_permutation(5, &mut rng);
        let mut ranks = vec![partial];

        for _ in 0..20 {
            gibbs_x(&mut ranks, &[vec![5, 4, 3, 2, 1]], &[0.9], &[0], 5, &mut rng);
            assert!(ranks[0].is_complete());
            assert_eq!(ranks[0].rank[1], 5);
            assert_eq!(ranks[0].rank[4], 1);
        }
    }

    #[test]
    fn test_complete_log_likelihood_boundaries() {
        let mut rng = StdRng::seed_from_u64(42);
        let rank = complete(&[1, 2, 3, 4], &mut rng);
        let members = vec![&rank];

        let (p, l) = complete_log_likelihood(&members, &[1, 2, 3, 4]);
        assert_eq!(p, 1.0);
        assert_eq!(l, 0.0);

        let (p, l) = complete_log_likelihood(&members, &[4, 3, 2, 1]);
        assert_eq!(p, 0.0);
        assert_eq!(l, 0.0);
    }

    #[test]
    fn test_complete_log_likelihood_interior() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = complete(&[1, 2, 3, 4], &mut rng);
        let b = complete(&[2, 1, 3, 4], &mut rng);
        let members = vec![&a, &b];

        let (p, l) = complete_log_likelihood(&members, &[1, 2, 3, 4]);
        assert!(p > 0.0 && p < 1.0);
        assert!(l < 0.0);
    }

    #[test]
    fn test_simu_m_recovers_reference() {
        let mut rng = StdRng::seed_from_u64(42);
        let reference = vec![3, 1, 4, 2, 5];
        let mut ranks: Vec<PartialRank> = (0..60)
            .map(|_| {
                let x = sample_isr(&reference, 0.9, &mut rng);
                complete(&x, &mut rng)
            })
            .collect();
        let z = vec![0; ranks.len()];
        let mut update = ReferenceUpdate {
            mu: vec![1, 3, 4, 2, 5],
            p: 0.7,
            log_likelihood: f64::NEG_INFINITY,
        };
        for _ in 0..15 {
            gibbs_y(&mut ranks, &[update.mu.clone()], &[update.p], &z, 10, &mut rng);
            update = simu_m(&ranks, &z, 0, &update.mu, update.p, 10, &mut rng);
        }

        let mut estimate = update.mu.clone();
        if update.p < 0.5 {
            estimate.reverse();
        }
        assert_eq!(estimate, reference);
    }

    #[test]
    fn test_simu_m_leaves_degenerate_dispersion() {
        let mut rng = StdRng::seed_from_u64(42);
        let ranks = vec![
            complete(&[1, 2, 3, 4], &mut rng),
            complete(&[4, 3, 2, 1], &mut rng),
        ];
        let z = vec![0, 0];

        // With p = 1 no ordering explains both subjects, so every move is
        // decided between two zero-probability states.
        let update = simu_m(&ranks, &z, 0, &[1, 2, 3, 4], 1.0, 5, &mut rng);

        assert!(update.p > 0.0 && update.p < 1.0);
        assert!(update.log_likelihood < 0.0);
        assert!(update.log_likelihood > f64::MIN);
        let mut items = update.mu.clone();
        items.sort_unstable();
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_simu_m_ignores_other_clusters() {
        let mut rng = StdRng::seed_from_u64(42);
        let ranks = vec![
            complete(&[1, 2, 3], &mut rng),
            complete(&[3, 2, 1], &mut rng),
        ];
        let z = vec![0, 1];

        let update = simu_m(&ranks, &z, 0, &[1, 2, 3], 0.9, 20, &mut rng);
        let mut estimate = update.mu.clone();
        if update.p < 0.5 {
            estimate.reverse();
        }
        assert_eq!(update.log_likelihood, 0.0);
        assert_eq!(estimate, vec![1, 2, 3]);
    }
}
