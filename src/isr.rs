//! Insertion Sort Rank (ISR) model
//!
//! An observed ordering `x` is produced by inserting the items one at a time,
//! in the presentation order `y`, into a growing sorted list. Each pairwise
//! comparison made during the insertion agrees with the reference ordering
//! `mu` with probability `p`.

use crate::combinatorics::{inverse_rank, positions, ranks_to_indices, sort_clusters, tab_factorial};
use rand::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Comparison counts of one insertion sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparisons {
    /// Number of comparisons performed (`A`)
    pub total: usize,
    /// Number of those agreeing with the reference ordering (`G`)
    pub agreements: usize,
}

impl Comparisons {
    /// Comparisons disagreeing with the reference (`A - G`)
    pub fn disagreements(&self) -> usize {
        self.total - self.agreements
    }
}

/// Count the comparisons needed to obtain `x` by inserting items in the order
/// `y`, and how many of them agree with `mu`.
///
/// Item `y[j]` is compared with every earlier item that ends up before it in
/// `x`, and with the nearest earlier item that ends up after it.
pub fn comparison(x: &[usize], y: &[usize], mu: &[usize]) -> Comparisons {
    let pos_x = positions(x);
    let pos_mu = positions(mu);
    let mut counts = Comparisons::default();

    for j in 1..y.len() {
        let current = y[j];
        let mut nearest_after: Option<usize> = None;

        for &previous in &y[..j] {
            if pos_x[previous] < pos_x[current] {
                counts.total += 1;
                if pos_mu[previous] < pos_mu[current] {
                    counts.agreements += 1;
                }
            } else if nearest_after.map_or(true, |b| pos_x[previous] < pos_x[b]) {
                nearest_after = Some(previous);
            }
        }

        if let Some(after) = nearest_after {
            counts.total += 1;
            if pos_mu[current] < pos_mu[after] {
                counts.agreements += 1;
            }
        }
    }

    counts
}

/// ISR probability of `x` given the presentation order `y`, reference `mu`
/// and dispersion `p`: `p^G (1-p)^(A-G)`.
pub fn proba_cond(x: &[usize], y: &[usize], mu: &[usize], p: f64) -> f64 {
    let counts = comparison(x, y, mu);
    p.powi(counts.agreements as i32) * (1.0 - p).powi(counts.disagreements() as i32)
}

/// Draw an ordering from the ISR model with a uniform presentation order.
pub fn sample_isr<R: Rng + ?Sized>(mu: &[usize], p: f64, rng: &mut R) -> Vec<usize> {
    let mut y: Vec<usize> = (1..=mu.len()).collect();
    y.shuffle(rng);
    sample_isr_given_order(mu, p, &y, rng)
}

/// Draw an ordering from the ISR model for a fixed presentation order `y`.
pub fn sample_isr_given_order<R: Rng + ?Sized>(
    mu: &[usize],
    p: f64,
    y: &[usize],
    rng: &mut R,
) -> Vec<usize> {
    let pos_mu = positions(mu);
    let mut x: Vec<usize> = Vec::with_capacity(y.len());

    for &current in y {
        let mut placed = false;
        for i in 0..x.len() {
            let mut before = pos_mu[current] < pos_mu[x[i]];
            if !rng.gen_bool(p) {
                before = !before;
            }
            if before {
                x.insert(i, current);
                placed = true;
                break;
            }
        }
        if !placed {
            x.push(current);
        }
    }

    x
}

/// Parameters of an ISR mixture, indexed `[dim][cluster]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureParameters {
    /// Reference orderings `mu[dim][cluster]`
    pub mu: Vec<Vec<Vec<usize>>>,
    /// Dispersions `p[dim][cluster]`
    pub p: Vec<Vec<f64>>,
    /// Mixture weights
    pub proportion: Vec<f64>,
}

impl MixtureParameters {
    /// Number of clusters
    pub fn n_clusters(&self) -> usize {
        self.proportion.len()
    }

    /// Number of ranking dimensions
    pub fn n_dims(&self) -> usize {
        self.mu.len()
    }

    /// Break the `(mu, p) ~ (reverse(mu), 1 - p)` symmetry and the label
    /// switching between clusters.
    ///
    /// Every `p < 0.5` is replaced by `1 - p` with its `mu` reversed, then the
    /// clusters are sorted by the index of their first-dimension `mu` and the
    /// labels in `z` are rewritten accordingly. Returns the permutation applied
    /// (see [`sort_clusters`]).
    pub fn canonicalize(&mut self, z: &mut [usize]) -> Vec<usize> {
        for (p_dim, mu_dim) in self.p.iter_mut().zip(self.mu.iter_mut()) {
            for (p, mu) in p_dim.iter_mut().zip(mu_dim.iter_mut()) {
                if *p < 0.5 {
                    *p = 1.0 - *p;
                    inverse_rank(mu);
                }
            }
        }

        if self.mu.is_empty() {
            return (0..self.n_clusters()).collect();
        }

        let tab = tab_factorial(self.mu[0].first().map_or(0, |mu| mu.len()));
        let mut keys = ranks_to_indices(&self.mu[0], &tab);

        sort_clusters(&mut keys, &mut self.proportion, &mut self.p, &mut self.mu, z)
    }
}
