//! SEM driver for rank clustering

use crate::distance::IterationDistances;
use crate::error::{Error, Result};
use crate::isr::MixtureParameters;
use crate::mixture::{write_report, InitialState, MixtureComponent, RankCluster, SemSettings};
use crate::utils::{bic, sample_categorical, validate_parameters, validate_sweeps};
use log::{debug, info, trace};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::prelude::*;
use rayon::prelude::*;
use std::io::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clustering of multivariate partial rankings with an ISR mixture
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RankClust {
    /// Number of clusters
    pub n_clusters: usize,
    /// Number of SEM iterations
    pub max_iter: usize,
    /// Iterations discarded before the trajectory is stored
    pub burn_in: usize,
    /// Gibbs sweeps of the E-step per dimension
    pub n_gibbs_se: Option<Vec<usize>>,
    /// Gibbs sweeps of the reference rank update per dimension
    pub n_gibbs_m: Option<Vec<usize>>,
    /// Gibbs sweeps of the log-likelihood estimator
    pub n_gibbs_l: usize,
    /// Burn-in sweeps of the log-likelihood estimator
    pub burn_l: usize,
    /// Number of independent runs
    pub n_init: usize,
    /// Random seed for reproducibility
    pub random_state: Option<u64>,
    /// Number of parallel jobs
    pub n_jobs: Option<usize>,
    /// Compute per-iteration distances to the final estimate
    pub detail: bool,
}

/// Result of rank clustering
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RankClustResult {
    /// MAP cluster of each subject
    pub labels: Array1<usize>,
    /// Posterior membership probabilities, `(n_samples, n_clusters)`
    pub tik: Array2<f64>,
    /// Estimated parameters, in canonical cluster order
    pub params: MixtureParameters,
    /// Estimated observed-data log-likelihood
    pub log_likelihood: f64,
    /// Bayesian information criterion
    pub bic: f64,
    /// Number of free parameters
    pub free_parameters: usize,
    /// Rankings with their unknown positions filled in
    pub completed: Array2<u32>,
    /// Starting state of the retained run
    pub initial: Option<InitialState>,
    /// Distances of every stored iteration to the estimate
    pub distances: Option<IterationDistances>,
    /// Seed of the retained run
    pub seed: u64,
}

impl RankClustResult {
    /// Number of clusters
    pub fn n_clusters(&self) -> usize {
        self.params.n_clusters()
    }

    /// Write the plain text parameter report
    pub fn write_parameters(&self, out: &mut dyn Write) -> io::Result<()> {
        write_report(out, self.log_likelihood, &self.params)
    }
}

impl Default for RankClust {
    fn default() -> Self {
        let settings = SemSettings::default();
        Self {
            n_clusters: 1,
            max_iter: settings.max_iter,
            burn_in: settings.burn_in,
            n_gibbs_se: settings.n_gibbs_se,
            n_gibbs_m: settings.n_gibbs_m,
            n_gibbs_l: settings.n_gibbs_l,
            burn_l: settings.burn_l,
            n_init: 1,
            random_state: None,
            n_jobs: None,
            detail: false,
        }
    }
}

impl RankClust {
    /// Create a new rank clusterer
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    /// Set the number of SEM iterations
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the number of burn-in iterations
    pub fn burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    /// Set the E-step Gibbs sweeps, one value per dimension
    pub fn n_gibbs_se(mut self, sweeps: Vec<usize>) -> Self {
        self.n_gibbs_se = Some(sweeps);
        self
    }

    /// Set the reference rank Gibbs sweeps, one value per dimension
    pub fn n_gibbs_m(mut self, sweeps: Vec<usize>) -> Self {
        self.n_gibbs_m = Some(sweeps);
        self
    }

    /// Set the sweeps and burn-in of the log-likelihood estimator
    pub fn likelihood_sweeps(mut self, n_gibbs_l: usize, burn_l: usize) -> Self {
        self.n_gibbs_l = n_gibbs_l;
        self.burn_l = burn_l;
        self
    }

    /// Set the number of independent runs
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set the random seed for reproducibility
    pub fn random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Set the number of parallel jobs
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    /// Enable per-iteration distance diagnostics
    pub fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    fn settings(&self) -> SemSettings {
        SemSettings {
            max_iter: self.max_iter,
            burn_in: self.burn_in,
            n_gibbs_se: self.n_gibbs_se.clone(),
            n_gibbs_m: self.n_gibbs_m.clone(),
            n_gibbs_l: self.n_gibbs_l,
            burn_l: self.burn_l,
            detail: self.detail,
        }
    }

    /// Fit the mixture to `data`, whose columns are the concatenated
    /// dimensions of sizes `modalities`, and keep the run with the highest
    /// log-likelihood.
    pub fn fit(&self, data: ArrayView2<u32>, modalities: &[usize]) -> Result<RankClustResult> {
        self.validate_input(data, modalities)?;

        let base_seed = self.random_state.unwrap_or_else(rand::random);
        info!(
            "fitting {} clusters on {} subjects, {} run(s), seed {}",
            self.n_clusters,
            data.nrows(),
            self.n_init,
            base_seed
        );

        let results: Vec<Result<RankClustResult>> = if self.should_use_parallel() {
            (0..self.n_init)
                .into_par_iter()
                .map(|i| self.fit_single(data, modalities, base_seed.wrapping_add(i as u64)))
                .collect()
        } else {
            (0..self.n_init)
                .map(|i| self.fit_single(data, modalities, base_seed.wrapping_add(i as u64)))
                .collect()
        };

        let mut best_result: Option<RankClustResult> = None;
        let mut last_error = None;
        for result in results {
            match result {
                Ok(result) => {
                    let better = best_result
                        .as_ref()
                        .map_or(true, |best| result.log_likelihood > best.log_likelihood);
                    if better {
                        best_result = Some(result);
                    }
                }
                Err(err) => {
                    debug!("run failed: {err}");
                    last_error = Some(err);
                }
            }
        }

        match (best_result, last_error) {
            (Some(result), _) => {
                info!(
                    "retained run with seed {}: log-likelihood {}, bic {}",
                    result.seed, result.log_likelihood, result.bic
                );
                Ok(result)
            }
            (None, Some(err)) => Err(err),
            (None, None) => Err(Error::computation_error("No successful runs")),
        }
    }

    /// Single SEM run
    fn fit_single(
        &self,
        data: ArrayView2<u32>,
        modalities: &[usize],
        seed: u64,
    ) -> Result<RankClustResult> {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut component = RankCluster::new(self.n_clusters, self.settings());
        component.set_data(data, modalities)?;
        component.initialize_step(&mut rng)?;

        let mut labels = component.class_labels().to_vec();
        for iteration in 0..self.max_iter {
            component.sampling_step(&mut rng)?;

            for (label, row) in labels.iter_mut().zip(component.tik().axis_iter(Axis(0))) {
                *label = sample_categorical(&row.to_vec(), &mut rng);
            }

            component.param_update_step(&labels, &mut rng)?;
            if iteration >= self.burn_in {
                component.store_intermediate_results(iteration - self.burn_in)?;
            }
            trace!("seed {seed}: SEM iteration {} done", iteration + 1);
        }

        component.finalize_step()?;
        let log_likelihood = component.log_likelihood(&mut rng)?;
        let free_parameters = component.free_parameters();
        debug!("seed {seed}: log-likelihood {log_likelihood}");

        let output = component.output().clone();
        Ok(RankClustResult {
            labels: Array1::from_vec(component.class_labels().to_vec()),
            tik: output.tik,
            params: component.params().clone(),
            log_likelihood,
            bic: bic(log_likelihood, component.n_samples(), free_parameters),
            free_parameters,
            completed: component.data().to_array(),
            initial: output.initial,
            distances: output.distances,
            seed,
        })
    }

    /// Validate input parameters and data
    fn validate_input(&self, data: ArrayView2<u32>, modalities: &[usize]) -> Result<()> {
        validate_parameters(
            self.n_clusters,
            self.max_iter,
            self.burn_in,
            self.n_gibbs_l,
            self.burn_l,
            self.n_init,
        )?;

        if data.nrows() == 0 {
            return Err(Error::invalid_data("Data cannot be empty"));
        }
        if self.n_clusters > data.nrows() {
            return Err(Error::invalid_parameter(
                "Number of clusters cannot exceed number of subjects",
            ));
        }
        if let Some(sweeps) = &self.n_gibbs_se {
            validate_sweeps("n_gibbs_se", sweeps, modalities.len())?;
        }
        if let Some(sweeps) = &self.n_gibbs_m {
            validate_sweeps("n_gibbs_m", sweeps, modalities.len())?;
        }

        Ok(())
    }

    /// Determine if parallel processing should be used
    fn should_use_parallel(&self) -> bool {
        match self.n_jobs {
            Some(1) => false,
            Some(_) => true,
            None => self.n_init > 1,
        }
    }

    /// Fit the model and return the MAP labels
    pub fn fit_predict(&self, data: ArrayView2<u32>, modalities: &[usize]) -> Result<Array1<usize>> {
        let result = self.fit(data, modalities)?;
        Ok(result.labels)
    }
}
