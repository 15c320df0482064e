//! Rank component of a mixture model
//!
//! A [`MixtureComponent`] is driven by an outer SEM loop that owns the shared
//! partition: the component samples its own latent variables, exposes
//! per-cluster responsibilities from which the driver draws labels, and
//! updates its parameters from the labels it is handed back.

use crate::data::RankData;
use crate::distance::{compute_distances, IterationDistances};
use crate::error::{Error, Result};
use crate::gibbs::{gibbs_x, gibbs_y, simu_m};
use crate::initialization::{random_parameters, random_partition, randomize_latent};
use crate::isr::{proba_cond, MixtureParameters};
use crate::likelihood::{maximize_likelihood, Snapshot, Trajectory};
use crate::utils::{
    cluster_sizes, default_sweeps, map_labels, validate_parameters, validate_sweeps,
};
use log::{debug, trace};
use ndarray::{Array2, ArrayView2};
use rand::RngCore;
use std::io::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Contract between a mixture component and the SEM driver.
pub trait MixtureComponent: Send {
    /// Load the raw rankings and the number of items of each dimension
    fn set_data(&mut self, data: ArrayView2<u32>, modalities: &[usize]) -> Result<()>;

    /// Draw a random starting state
    fn initialize_step(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Stochastic E-step: resample the latent variables and refresh the
    /// responsibilities
    fn sampling_step(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Current responsibilities, `(n_samples, n_clusters)`
    fn tik(&self) -> ArrayView2<'_, f64>;

    /// Labels the component currently works with
    fn class_labels(&self) -> &[usize];

    /// M-step given the labels drawn by the driver
    fn param_update_step(&mut self, labels: &[usize], rng: &mut dyn RngCore) -> Result<()>;

    /// Record the current state at trajectory slot `iteration`
    fn store_intermediate_results(&mut self, iteration: usize) -> Result<()>;

    /// Close the SEM loop
    fn finalize_step(&mut self) -> Result<()>;

    /// Likelihood of `sample` under `cluster`, without the mixture weight
    fn posterior_probability(&self, sample: usize, cluster: usize) -> f64;

    /// Final observed-data log-likelihood
    fn log_likelihood(&mut self, rng: &mut dyn RngCore) -> Result<f64>;

    /// Number of free parameters
    fn free_parameters(&self) -> usize;

    /// Human readable parameter report
    fn write_parameters(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Number of subjects
    fn n_samples(&self) -> usize;

    /// Number of clusters
    fn n_clusters(&self) -> usize;

    /// Boxed copy of the component
    fn clone_box(&self) -> Box<dyn MixtureComponent>;
}

/// Settings of the SEM algorithm for one component
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SemSettings {
    /// Number of SEM iterations
    pub max_iter: usize,
    /// Iterations discarded before storing the trajectory
    pub burn_in: usize,
    /// Gibbs sweeps of the E-step per dimension, `m(m-1)/2` when unset
    pub n_gibbs_se: Option<Vec<usize>>,
    /// Gibbs sweeps of the reference-rank update per dimension, `m(m-1)/2`
    /// when unset
    pub n_gibbs_m: Option<Vec<usize>>,
    /// Gibbs sweeps of the log-likelihood estimator
    pub n_gibbs_l: usize,
    /// Burn-in sweeps of the log-likelihood estimator
    pub burn_l: usize,
    /// Compute the distance of every stored iteration to the final estimate
    pub detail: bool,
}

impl Default for SemSettings {
    fn default() -> Self {
        Self {
            max_iter: 100,
            burn_in: 10,
            n_gibbs_se: None,
            n_gibbs_m: None,
            n_gibbs_l: 500,
            burn_l: 50,
            detail: false,
        }
    }
}

/// Lifecycle of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No data loaded
    Uninitialized,
    /// Data loaded, state not drawn yet
    DataLoaded,
    /// Random starting state drawn
    Initialized,
    /// Latent variables just resampled
    Sampling,
    /// Parameters just updated
    Updating,
    /// SEM loop closed
    Finalized,
}

/// State drawn by the initialization
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InitialState {
    /// Initial labels
    pub z: Vec<usize>,
    /// Initial parameters
    pub params: MixtureParameters,
    /// Initial completion of the partial rankings, `[dim][k]`
    pub partial_ranks: Vec<Vec<Vec<usize>>>,
}

/// Results reported by a component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    /// Responsibilities
    pub tik: Array2<f64>,
    /// Log-likelihood, once estimated
    pub log_likelihood: Option<f64>,
    /// Starting state
    pub initial: Option<InitialState>,
    /// Distances of the stored iterations to the final estimate
    pub distances: Option<IterationDistances>,
}

/// ISR mixture component for multivariate partial rankings
#[derive(Debug, Clone)]
pub struct RankCluster {
    n_clusters: usize,
    settings: SemSettings,
    stage: Stage,
    data: RankData,
    partial_index: Vec<Vec<usize>>,
    n_gibbs_se: Vec<usize>,
    n_gibbs_m: Vec<usize>,
    z: Vec<usize>,
    params: MixtureParameters,
    trajectory: Trajectory,
    iteration: usize,
    output: Output,
}

impl RankCluster {
    /// Create a component with `n_clusters` clusters
    pub fn new(n_clusters: usize, settings: SemSettings) -> Self {
        Self {
            n_clusters,
            settings,
            stage: Stage::Uninitialized,
            data: RankData::default(),
            partial_index: Vec::new(),
            n_gibbs_se: Vec::new(),
            n_gibbs_m: Vec::new(),
            z: Vec::new(),
            params: MixtureParameters {
                mu: Vec::new(),
                p: Vec::new(),
                proportion: Vec::new(),
            },
            trajectory: Trajectory::default(),
            iteration: 0,
            output: Output::default(),
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current parameters
    pub fn params(&self) -> &MixtureParameters {
        &self.params
    }

    /// Rankings with their current completion and presentation orders
    pub fn data(&self) -> &RankData {
        &self.data
    }

    /// Subjects with a partial ranking, per dimension
    pub fn partial_index(&self) -> &[Vec<usize>] {
        &self.partial_index
    }

    /// Stored trajectory
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Reported results
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Overwrite this component with `other`
    pub fn copy(&mut self, other: &Self) {
        self.clone_from(other);
    }

    fn ensure(&self, allowed: &[Stage], operation: &str) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(Error::computation_error(format!(
                "{operation} called in stage {:?}",
                self.stage
            )))
        }
    }

    /// Normalized `proportion_k * prod_dim P(x | y, mu_k, p_k)` per subject.
    fn update_tik(&mut self) {
        let n = self.data.n_samples();
        let g = self.n_clusters;
        let mut tik = Array2::zeros((n, g));

        for i in 0..n {
            let mut total = 0.0;
            for k in 0..g {
                let mut value = self.params.proportion[k];
                for dim in 0..self.data.n_dims() {
                    let rank = &self.data.dim(dim)[i];
                    value *= proba_cond(
                        &rank.rank,
                        &rank.y,
                        &self.params.mu[dim][k],
                        self.params.p[dim][k],
                    );
                }
                tik[[i, k]] = value;
                total += value;
            }

            if total > 0.0 && total.is_finite() {
                for k in 0..g {
                    tik[[i, k]] /= total;
                }
            } else {
                for k in 0..g {
                    tik[[i, k]] = self.params.proportion[k];
                }
            }
        }

        self.output.tik = tik;
    }
}

impl MixtureComponent for RankCluster {
    fn set_data(&mut self, data: ArrayView2<u32>, modalities: &[usize]) -> Result<()> {
        let settings = &self.settings;
        validate_parameters(
            self.n_clusters,
            settings.max_iter,
            settings.burn_in,
            settings.n_gibbs_l,
            settings.burn_l,
            1,
        )?;

        let ranks = RankData::from_array(data, modalities)?;
        if self.n_clusters > ranks.n_samples() {
            return Err(Error::invalid_parameter(
                "Number of clusters cannot exceed number of subjects",
            ));
        }

        let n_gibbs_se = settings
            .n_gibbs_se
            .clone()
            .unwrap_or_else(|| default_sweeps(modalities));
        let n_gibbs_m = settings
            .n_gibbs_m
            .clone()
            .unwrap_or_else(|| default_sweeps(modalities));
        validate_sweeps("n_gibbs_se", &n_gibbs_se, modalities.len())?;
        validate_sweeps("n_gibbs_m", &n_gibbs_m, modalities.len())?;

        debug!(
            "rank data: {} subjects, modalities {:?}, partial: {}",
            ranks.n_samples(),
            modalities,
            ranks.has_partial()
        );

        self.partial_index = ranks.partial_index();
        self.data = ranks;
        self.n_gibbs_se = n_gibbs_se;
        self.n_gibbs_m = n_gibbs_m;
        self.trajectory = Trajectory::with_capacity(settings.max_iter - settings.burn_in);
        self.output = Output::default();
        self.stage = Stage::DataLoaded;
        Ok(())
    }

    fn initialize_step(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.ensure(
            &[
                Stage::DataLoaded,
                Stage::Initialized,
                Stage::Sampling,
                Stage::Updating,
                Stage::Finalized,
            ],
            "initialize_step",
        )?;

        let n = self.data.n_samples();
        let (z, proportion) = random_partition(n, self.n_clusters, rng);
        self.params = random_parameters(self.data.modalities(), proportion, rng);
        randomize_latent(&mut self.data, rng);
        self.z = z;

        self.output = Output {
            tik: Array2::zeros((n, self.n_clusters)),
            initial: Some(InitialState {
                z: self.z.clone(),
                params: self.params.clone(),
                partial_ranks: self.data.partial_ranks(&self.partial_index),
            }),
            ..Output::default()
        };
        self.trajectory =
            Trajectory::with_capacity(self.settings.max_iter - self.settings.burn_in);
        self.iteration = 0;
        self.stage = Stage::Initialized;
        Ok(())
    }

    fn sampling_step(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.ensure(
            &[Stage::Initialized, Stage::Sampling, Stage::Updating],
            "sampling_step",
        )?;

        for dim in 0..self.data.n_dims() {
            gibbs_y(
                self.data.dim_mut(dim),
                &self.params.mu[dim],
                &self.params.p[dim],
                &self.z,
                self.n_gibbs_se[dim],
                rng,
            );
        }
        self.update_tik();

        self.stage = Stage::Sampling;
        Ok(())
    }

    fn tik(&self) -> ArrayView2<'_, f64> {
        self.output.tik.view()
    }

    fn class_labels(&self) -> &[usize] {
        &self.z
    }

    fn param_update_step(&mut self, labels: &[usize], rng: &mut dyn RngCore) -> Result<()> {
        self.ensure(
            &[Stage::Initialized, Stage::Sampling, Stage::Updating],
            "param_update_step",
        )?;

        let n = self.data.n_samples();
        if labels.len() != n {
            return Err(Error::invalid_data(format!(
                "expected {n} labels, got {}",
                labels.len()
            )));
        }
        if labels.iter().any(|&k| k >= self.n_clusters) {
            return Err(Error::invalid_data("label out of range"));
        }
        self.z.copy_from_slice(labels);

        for dim in 0..self.data.n_dims() {
            gibbs_x(
                self.data.dim_mut(dim),
                &self.params.mu[dim],
                &self.params.p[dim],
                &self.z,
                self.n_gibbs_se[dim],
                rng,
            );
        }

        let sizes = cluster_sizes(&self.z, self.n_clusters);
        if let Some(empty) = sizes.iter().position(|&size| size == 0) {
            return Err(Error::non_convergence(empty, self.iteration));
        }
        for (proportion, &size) in self.params.proportion.iter_mut().zip(sizes.iter()) {
            *proportion = size as f64 / n as f64;
        }

        for dim in 0..self.data.n_dims() {
            for k in 0..self.n_clusters {
                let update = simu_m(
                    self.data.dim(dim),
                    &self.z,
                    k,
                    &self.params.mu[dim][k],
                    self.params.p[dim][k],
                    self.n_gibbs_m[dim],
                    rng,
                );
                self.params.mu[dim][k] = update.mu;
                self.params.p[dim][k] = update.p;
            }
        }

        trace!(
            "iteration {}: proportions {:?}, p {:?}",
            self.iteration,
            self.params.proportion,
            self.params.p
        );

        self.iteration += 1;
        self.stage = Stage::Updating;
        Ok(())
    }

    fn store_intermediate_results(&mut self, iteration: usize) -> Result<()> {
        self.ensure(&[Stage::Updating], "store_intermediate_results")?;

        let mut params = self.params.clone();
        let mut z = self.z.clone();
        params.canonicalize(&mut z);

        let snapshot = Snapshot {
            z,
            params,
            partial_ranks: self.data.partial_ranks(&self.partial_index),
        };
        self.trajectory.store(iteration, snapshot)
    }

    fn finalize_step(&mut self) -> Result<()> {
        self.ensure(
            &[Stage::Sampling, Stage::Updating, Stage::Finalized],
            "finalize_step",
        )?;
        self.stage = Stage::Finalized;
        Ok(())
    }

    fn posterior_probability(&self, sample: usize, cluster: usize) -> f64 {
        self.output.tik[[sample, cluster]] / self.params.proportion[cluster]
    }

    fn log_likelihood(&mut self, rng: &mut dyn RngCore) -> Result<f64> {
        if let Some(log_likelihood) = self.output.log_likelihood {
            return Ok(log_likelihood);
        }

        let (params, estimate) = maximize_likelihood(
            &self.trajectory,
            &self.data,
            &self.partial_index,
            self.settings.n_gibbs_l,
            self.settings.burn_l,
            rng,
        )?;

        self.params = params;
        self.data.set_presentation_orders(&estimate.y);
        self.data
            .set_partial_ranks(&self.partial_index, &estimate.partial_ranks);
        self.z = map_labels(estimate.tik.view()).to_vec();

        if self.settings.detail {
            self.output.distances = Some(compute_distances(
                &self.z,
                &self.params,
                &self.partial_index,
                &estimate.partial_ranks,
                self.data.n_samples(),
                self.trajectory.snapshots(),
            ));
        }

        self.output.tik = estimate.tik;
        self.output.log_likelihood = Some(estimate.log_likelihood);
        self.trajectory = Trajectory::default();

        Ok(estimate.log_likelihood)
    }

    /// Counts `(mu, p)` as two parameters per cluster and dimension, plus
    /// `g - 1` proportions.
    fn free_parameters(&self) -> usize {
        2 * self.n_clusters * self.data.n_dims() + self.n_clusters - 1
    }

    fn write_parameters(&self, out: &mut dyn Write) -> io::Result<()> {
        write_report(
            out,
            self.output.log_likelihood.unwrap_or(f64::NAN),
            &self.params,
        )
    }

    fn n_samples(&self) -> usize {
        self.data.n_samples()
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    fn clone_box(&self) -> Box<dyn MixtureComponent> {
        Box::new(self.clone())
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plain text report of the estimated parameters.
pub fn write_report(
    out: &mut dyn Write,
    log_likelihood: f64,
    params: &MixtureParameters,
) -> io::Result<()> {
    writeln!(out, "************ RESULTS ************")?;
    writeln!(out, "** Number of clusters: {}", params.n_clusters())?;
    writeln!(out, "** Loglikelihood: {log_likelihood}")?;
    writeln!(out)?;
    writeln!(out, "** Estimated parameters:")?;
    writeln!(out, "* Proportion: ")?;
    writeln!(out, "{}", join(&params.proportion))?;
    writeln!(out, "* Pi: ")?;
    for (dim, p) in params.p.iter().enumerate() {
        writeln!(out, "Dim {}: {}", dim + 1, join(p))?;
    }
    writeln!(out, "* Reference Rank: ")?;
    for (dim, mu) in params.mu.iter().enumerate() {
        writeln!(out, "Dim {}:", dim + 1)?;
        for rank in mu {
            writeln!(out, "{}", join(rank))?;
        }
    }
    writeln!(out, "*********************************")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isr::sample_isr;
    use ndarray::Array2;
    use rand::prelude::*;

    fn settings(max_iter: usize, burn_in: usize) -> SemSettings {
        SemSettings {
            max_iter,
            burn_in,
            n_gibbs_l: 40,
            burn_l: 10,
            ..SemSettings::default()
        }
    }

    fn isr_data(n: usize, mu: &[usize], p: f64, rng: &mut StdRng) -> Array2<u32> {
        let m = mu.len();
        let mut values = Vec::with_capacity(n * m);
        for _ in 0..n {
            values.extend(sample_isr(mu, p, rng).into_iter().map(|v| v as u32));
        }
        Array2::from_shape_vec((n, m), values).unwrap()
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(1, settings(5, 1));
        assert!(component.initialize_step(&mut rng).is_err());

        let data = isr_data(5, &[1, 2, 3], 0.9, &mut rng);
        component.set_data(data.view(), &[3]).unwrap();
        assert!(component.sampling_step(&mut rng).is_err());
        assert!(component.store_intermediate_results(0).is_err());

        component.initialize_step(&mut rng).unwrap();
        assert_eq!(component.stage(), Stage::Initialized);
        component.sampling_step(&mut rng).unwrap();
        assert_eq!(component.stage(), Stage::Sampling);
    }

    #[test]
    fn test_free_parameters() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(3, settings(5, 1));
        let data = Array2::from_shape_vec(
            (3, 5),
            vec![1, 2, 3, 1, 2, 2, 1, 3, 2, 1, 3, 2, 1, 1, 2],
        )
        .unwrap();
        component.set_data(data.view(), &[3, 2]).unwrap();
        component.initialize_step(&mut rng).unwrap();
        assert_eq!(component.free_parameters(), 2 * 3 * 2 + 3 - 1);
    }

    #[test]
    fn test_empty_cluster_is_non_convergence() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(2, settings(5, 1));
        let data = isr_data(6, &[1, 2, 3, 4], 0.9, &mut rng);
        component.set_data(data.view(), &[4]).unwrap();
        component.initialize_step(&mut rng).unwrap();
        component.sampling_step(&mut rng).unwrap();

        let err = component
            .param_update_step(&[0; 6], &mut rng)
            .unwrap_err();
        assert_eq!(err, Error::non_convergence(1, 0));
    }

    #[test]
    fn test_tik_rows_are_normalized() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(2, settings(5, 1));
        let data = isr_data(20, &[1, 2, 3, 4], 0.8, &mut rng);
        component.set_data(data.view(), &[4]).unwrap();
        component.initialize_step(&mut rng).unwrap();
        component.sampling_step(&mut rng).unwrap();

        for row in component.tik().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_posterior_probability_matches_tik() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut component = RankCluster::new(2, settings(5, 1));
        let data = isr_data(30, &[1, 2, 3, 4], 0.8, &mut rng);
        component.set_data(data.view(), &[4]).unwrap();
        component.initialize_step(&mut rng).unwrap();
        component.sampling_step(&mut rng).unwrap();

        let proportion = component.params().proportion.clone();
        for i in 0..component.n_samples() {
            let total: f64 = (0..2)
                .map(|k| proportion[k] * component.posterior_probability(i, k))
                .sum();
            assert!((total - 1.0).abs() < 1e-9);
        }

        let expected = component.tik()[[3, 1]] / proportion[1];
        assert!((component.posterior_probability(3, 1) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_store_does_not_touch_live_state() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(2, settings(5, 0));
        let data = isr_data(20, &[1, 2, 3, 4], 0.8, &mut rng);
        component.set_data(data.view(), &[4]).unwrap();
        component.initialize_step(&mut rng).unwrap();
        component.sampling_step(&mut rng).unwrap();
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        component.param_update_step(&labels, &mut rng).unwrap();

        let params_before = component.params().clone();
        let labels_before = component.class_labels().to_vec();
        component.store_intermediate_results(0).unwrap();

        assert_eq!(component.params(), &params_before);
        assert_eq!(component.class_labels(), labels_before.as_slice());
        assert_eq!(component.trajectory().len(), 1);
        assert!(component.trajectory().snapshots()[0]
            .params
            .p
            .iter()
            .flatten()
            .all(|&p| p >= 0.5));
    }

    #[test]
    fn test_clone_and_copy() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut component = RankCluster::new(1, settings(5, 1));
        let data = isr_data(5, &[1, 2, 3], 0.9, &mut rng);
        component.set_data(data.view(), &[3]).unwrap();
        component.initialize_step(&mut rng).unwrap();

        let boxed = component.clone_box();
        assert_eq!(boxed.n_samples(), 5);

        let mut other = RankCluster::new(4, SemSettings::default());
        other.copy(&component);
        assert_eq!(other.params(), component.params());
        assert_eq!(other.n_clusters(), 1);
    }

    #[test]
    fn test_write_report() {
        let params = MixtureParameters {
            mu: vec![vec![vec![1, 2, 3]]],
            p: vec![vec![0.9]],
            proportion: vec![1.0],
        };
        let mut out = Vec::new();
        write_report(&mut out, -12.5, &params).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("** Number of clusters: 1"));
        assert!(text.contains("** Loglikelihood: -12.5"));
        assert!(text.contains("Dim 1: 0.9"));
        assert!(text.contains("1 2 3"));
    }
}
