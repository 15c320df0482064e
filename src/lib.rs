//! # Rank Clustering
//!
//! This crate clusters multivariate and partial rankings with a mixture of
//! Insertion Sorting Rank (ISR) models, estimated by a stochastic EM (SEM)
//! algorithm with Gibbs sampling of the latent presentation orders and of the
//! unknown positions of partial rankings.
//!
//! ## Features
//!
//! - **ISR model**: rank probabilities driven by a reference rank `mu` and a
//!   dispersion `p`
//! - **Multivariate rankings**: several ranking dimensions per subject, each
//!   with its own number of items
//! - **Partial rankings**: unknown positions are resampled during estimation
//! - Log-likelihood estimation, BIC, and per-iteration diagnostics
//! - Parallel independent runs via Rayon
//!
//! ## Example
//!
//! ```rust
//! use rankclust::{sample_isr, RankClust};
//! use ndarray::Array2;
//! use rand::prelude::*;
//!
//! // Simulate 20 rankings of 4 items around the reference rank 1 2 3 4
//! let mut rng = StdRng::seed_from_u64(0);
//! let mut values = Vec::new();
//! for _ in 0..20 {
//!     values.extend(sample_isr(&[1, 2, 3, 4], 0.9, &mut rng).into_iter().map(|v| v as u32));
//! }
//! let data = Array2::from_shape_vec((20, 4), values).unwrap();
//!
//! let model = RankClust::new(1)
//!     .max_iter(20)
//!     .burn_in(5)
//!     .likelihood_sweeps(50, 10)
//!     .random_state(42);
//!
//! let result = model.fit(data.view(), &[4]).unwrap();
//! println!("Reference rank: {:?}", result.params.mu[0][0]);
//! println!("Log-likelihood: {}", result.log_likelihood);
//! ```

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod combinatorics;
pub mod data;
pub mod distance;
pub mod error;
pub mod gibbs;
pub mod initialization;
pub mod isr;
pub mod likelihood;
pub mod mixture;
pub mod sem;
pub mod utils;

pub use data::{PartialRank, RankData};
pub use distance::{kendall_distance, rand_index, IterationDistances};
pub use error::{Error, Result};
pub use isr::{comparison, proba_cond, sample_isr, Comparisons, MixtureParameters};
pub use mixture::{MixtureComponent, RankCluster, SemSettings, Stage};
pub use sem::{RankClust, RankClustResult};

/// Re-export commonly used types from ndarray
pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
