//! Log-likelihood estimation from the SEM trajectory
//!
//! The parameters visited after burn-in are grouped by their reference
//! orderings. Each group is averaged into one candidate whose observed-data
//! log-likelihood is estimated by Gibbs sampling of the latent presentation
//! orders and missing positions; the best candidate is the final estimate.

use crate::data::RankData;
use crate::error::{Error, Result};
use crate::initialization::random_permutation;
use crate::isr::{proba_cond, MixtureParameters};
use crate::utils::accept_proposal;
use log::debug;
use ndarray::Array2;
use rand::prelude::*;
use std::collections::BTreeMap;

/// State recorded at one post burn-in SEM iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Cluster labels
    pub z: Vec<usize>,
    /// Canonicalized parameters
    pub params: MixtureParameters,
    /// Completed partial rankings, `[dim][k]`
    pub partial_ranks: Vec<Vec<Vec<usize>>>,
}

/// Snapshots of the SEM chain, one slot per post burn-in iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    capacity: usize,
    snapshots: Vec<Snapshot>,
}

impl Trajectory {
    /// Empty store for `capacity` iterations
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: Vec::with_capacity(capacity),
        }
    }

    /// Write `snapshot` at `slot`. Slots are filled in order; rewriting an
    /// already filled slot replaces it.
    pub fn store(&mut self, slot: usize, snapshot: Snapshot) -> Result<()> {
        if slot >= self.capacity {
            return Err(Error::computation_error(format!(
                "trajectory slot {slot} exceeds capacity {}",
                self.capacity
            )));
        }
        match slot.cmp(&self.snapshots.len()) {
            std::cmp::Ordering::Less => self.snapshots[slot] = snapshot,
            std::cmp::Ordering::Equal => self.snapshots.push(snapshot),
            std::cmp::Ordering::Greater => {
                return Err(Error::computation_error(format!(
                    "trajectory slot {slot} stored before slot {}",
                    self.snapshots.len()
                )))
            }
        }
        Ok(())
    }

    /// Stored snapshots
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether nothing was stored
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Averaged parameters of the snapshots sharing one set of reference
/// orderings.
#[derive(Debug, Clone, PartialEq)]
pub struct PooledCandidate {
    /// Averaged parameters
    pub params: MixtureParameters,
    /// Number of snapshots in the group
    pub count: usize,
}

/// Group snapshots whose reference orderings are identical in every dimension
/// and cluster, averaging `p` and the proportions within each group.
///
/// Groups come out in order of first appearance.
pub fn pool_by_reference(snapshots: &[Snapshot]) -> Vec<PooledCandidate> {
    let mut groups: BTreeMap<&Vec<Vec<Vec<usize>>>, usize> = BTreeMap::new();
    let mut candidates: Vec<PooledCandidate> = Vec::new();

    for snapshot in snapshots {
        let params = &snapshot.params;
        match groups.get(&params.mu) {
            Some(&index) => {
                let pooled = &mut candidates[index];
                pooled.count += 1;
                for (sum, value) in pooled.params.proportion.iter_mut().zip(&params.proportion) {
                    *sum += value;
                }
                for (sum_dim, p_dim) in pooled.params.p.iter_mut().zip(&params.p) {
                    for (sum, value) in sum_dim.iter_mut().zip(p_dim) {
                        *sum += value;
                    }
                }
            }
            None => {
                groups.insert(&params.mu, candidates.len());
                candidates.push(PooledCandidate {
                    params: params.clone(),
                    count: 1,
                });
            }
        }
    }

    for pooled in candidates.iter_mut() {
        let count = pooled.count as f64;
        for value in pooled.params.proportion.iter_mut() {
            *value /= count;
        }
        for value in pooled.params.p.iter_mut().flatten() {
            *value /= count;
        }
    }

    candidates
}

/// Monte-Carlo estimate of the observed-data log-likelihood for fixed
/// parameters, with the latent state reached by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodEstimate {
    /// Estimated log-likelihood
    pub log_likelihood: f64,
    /// Averaged responsibilities, `(n_samples, n_clusters)`
    pub tik: Array2<f64>,
    /// Final presentation orders, `[dim][subject]`
    pub y: Vec<Vec<Vec<usize>>>,
    /// Final completed partial rankings, `[dim][k]`
    pub partial_ranks: Vec<Vec<Vec<usize>>>,
}

/// Per-cluster terms `proportion_k * prod_dim proba[dim][k]`.
fn cluster_terms(proba: &[Vec<f64>], proportion: &[f64]) -> Vec<f64> {
    proportion
        .iter()
        .enumerate()
        .map(|(k, &prop)| prop * proba.iter().map(|row| row[k]).product::<f64>())
        .collect()
}

fn mixture_density(proba: &[Vec<f64>], proportion: &[f64]) -> f64 {
    cluster_terms(proba, proportion).iter().sum()
}

fn proba_row(x: &[usize], y: &[usize], params: &MixtureParameters, dim: usize) -> Vec<f64> {
    params.mu[dim]
        .iter()
        .zip(params.p[dim].iter())
        .map(|(mu, &p)| proba_cond(x, y, mu, p))
        .collect()
}

/// Estimate the log-likelihood of `params`.
///
/// For each subject a Gibbs chain of `n_gibbs_l` sweeps alternates
/// presentation orders and missing positions under the mixture density
/// `sum_k prop_k prod_dim P(x | y, mu, p)`. After `burn_l` sweeps the inverse
/// density is averaged, giving the subject's contribution
/// `-ln(mean(1 / density))`, and the normalized cluster terms are averaged
/// into `tik`.
pub fn compute_likelihood<R: Rng + ?Sized>(
    data: &RankData,
    partial_index: &[Vec<usize>],
    params: &MixtureParameters,
    n_gibbs_l: usize,
    burn_l: usize,
    rng: &mut R,
) -> LikelihoodEstimate {
    let n = data.n_samples();
    let g = params.n_clusters();
    let n_dims = data.n_dims();
    let kept = n_gibbs_l.saturating_sub(burn_l).max(1) as f64;

    let mut tik = Array2::zeros((n, g));
    let mut y_out = vec![Vec::with_capacity(n); n_dims];
    let mut x_out: Vec<Vec<Vec<usize>>> = partial_index
        .iter()
        .map(|subjects| Vec::with_capacity(subjects.len()))
        .collect();
    let mut log_likelihood = 0.0;

    for i in 0..n {
        let mut x: Vec<Vec<usize>> = (0..n_dims).map(|dim| data.dim(dim)[i].rank.clone()).collect();
        let mut y: Vec<Vec<usize>> = data
            .modalities()
            .iter()
            .map(|&m| random_permutation(m, rng))
            .collect();
        let mut proba: Vec<Vec<f64>> = (0..n_dims)
            .map(|dim| proba_row(&x[dim], &y[dim], params, dim))
            .collect();
        let mut density = mixture_density(&proba, &params.proportion);

        let mut inverse_sum = 0.0;
        let mut tik_row = vec![0.0; g];

        for iter in 0..n_gibbs_l {
            for dim in 0..n_dims {
                for pos in 0..y[dim].len() - 1 {
                    y[dim].swap(pos, pos + 1);
                    let mut row = proba_row(&x[dim], &y[dim], params, dim);
                    std::mem::swap(&mut proba[dim], &mut row);
                    let proposed = mixture_density(&proba, &params.proportion);

                    if accept_proposal(density, proposed, rng) {
                        density = proposed;
                    } else {
                        std::mem::swap(&mut proba[dim], &mut row);
                        y[dim].swap(pos, pos + 1);
                    }
                }
            }

            for dim in 0..n_dims {
                let rank = &data.dim(dim)[i];
                if !rank.is_partial {
                    continue;
                }
                for pair in rank.missing_index.windows(2) {
                    x[dim].swap(pair[0], pair[1]);
                    let mut row = proba_row(&x[dim], &y[dim], params, dim);
                    std::mem::swap(&mut proba[dim], &mut row);
                    let proposed = mixture_density(&proba, &params.proportion);

                    if accept_proposal(density, proposed, rng) {
                        density = proposed;
                    } else {
                        std::mem::swap(&mut proba[dim], &mut row);
                        x[dim].swap(pair[0], pair[1]);
                    }
                }
            }

            if iter >= burn_l {
                let terms = cluster_terms(&proba, &params.proportion);
                let den: f64 = terms.iter().sum();
                inverse_sum += 1.0 / den;
                if den > 0.0 {
                    for (acc, term) in tik_row.iter_mut().zip(terms.iter()) {
                        *acc += term / den;
                    }
                }
            }
        }

        log_likelihood -= (inverse_sum / kept).ln();
        for (k, acc) in tik_row.iter().enumerate() {
            tik[[i, k]] = acc / kept;
        }

        for (dim, (y_dim, x_dim)) in y.into_iter().zip(x.into_iter()).enumerate() {
            y_out[dim].push(y_dim);
            if data.dim(dim)[i].is_partial {
                x_out[dim].push(x_dim);
            }
        }
    }

    LikelihoodEstimate {
        log_likelihood,
        tik,
        y: y_out,
        partial_ranks: x_out,
    }
}

/// Pool the trajectory and keep the candidate with the highest estimated
/// log-likelihood.
pub fn maximize_likelihood<R: Rng + ?Sized>(
    trajectory: &Trajectory,
    data: &RankData,
    partial_index: &[Vec<usize>],
    n_gibbs_l: usize,
    burn_l: usize,
    rng: &mut R,
) -> Result<(MixtureParameters, LikelihoodEstimate)> {
    if trajectory.is_empty() {
        return Err(Error::computation_error(
            "no stored iteration to estimate the log-likelihood from",
        ));
    }

    let candidates = pool_by_reference(trajectory.snapshots());
    debug!(
        "{} distinct reference rank sets out of {} stored iterations",
        candidates.len(),
        trajectory.len()
    );

    let mut best: Option<(MixtureParameters, LikelihoodEstimate)> = None;
    for candidate in candidates {
        let estimate = compute_likelihood(
            data,
            partial_index,
            &candidate.params,
            n_gibbs_l,
            burn_l,
            rng,
        );
        let improves = best
            .as_ref()
            .map_or(true, |(_, b)| estimate.log_likelihood > b.log_likelihood);
        if improves {
            best = Some((candidate.params, estimate));
        }
    }

    best.ok_or_else(|| Error::computation_error("no candidate parameters"))
}
