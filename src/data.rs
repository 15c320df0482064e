//! Ranking data: conversion from the raw integer array to partial rankings

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};
use std::collections::BTreeSet;

/// One subject's ranking for one dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRank {
    /// Ordering of the items; `0` marks an unresolved position until the
    /// ranking is completed
    pub rank: Vec<usize>,
    /// Whether some positions were not observed
    pub is_partial: bool,
    /// Items not observed anywhere in the ranking
    pub missing_data: BTreeSet<usize>,
    /// Unresolved positions, ascending
    pub missing_index: Vec<usize>,
    /// Latent presentation order
    pub y: Vec<usize>,
}

impl PartialRank {
    /// Build a ranking from its observed positions (`0` for unknown).
    pub fn from_observed(observed: &[usize]) -> Result<Self> {
        let m = observed.len();
        let mut missing_data: BTreeSet<usize> = (1..=m).collect();
        let mut missing_index = Vec::new();

        for (pos, &item) in observed.iter().enumerate() {
            if item == 0 {
                missing_index.push(pos);
            } else if item > m {
                return Err(Error::invalid_data(format!(
                    "item {item} out of range 1..={m}"
                )));
            } else if !missing_data.remove(&item) {
                return Err(Error::invalid_data(format!(
                    "item {item} appears more than once in a ranking"
                )));
            }
        }

        Ok(Self {
            rank: observed.to_vec(),
            is_partial: !missing_index.is_empty(),
            missing_data,
            missing_index,
            y: (1..=m).collect(),
        })
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.rank.len()
    }

    /// Whether the ranking has no items
    pub fn is_empty(&self) -> bool {
        self.rank.is_empty()
    }

    /// Whether `rank` currently holds a permutation of `1..=m`
    pub fn is_complete(&self) -> bool {
        let m = self.rank.len();
        let mut seen = vec![false; m + 1];
        self.rank.iter().all(|&item| {
            if item == 0 || item > m || seen[item] {
                false
            } else {
                seen[item] = true;
                true
            }
        })
    }
}

/// Multivariate ranking data, stored `[dim][subject]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankData {
    modalities: Vec<usize>,
    ranks: Vec<Vec<PartialRank>>,
}

impl RankData {
    /// Convert a `(n_samples, sum(modalities))` array whose rows concatenate
    /// the observed orderings of every dimension, `0` meaning unknown.
    pub fn from_array(data: ArrayView2<u32>, modalities: &[usize]) -> Result<Self> {
        validate_modalities(modalities)?;

        if data.nrows() == 0 {
            return Err(Error::invalid_data("Data cannot be empty"));
        }

        let expected: usize = modalities.iter().sum();
        if data.ncols() != expected {
            return Err(Error::invalid_data(format!(
                "expected {expected} columns for modalities {modalities:?}, found {}",
                data.ncols()
            )));
        }

        let mut ranks = vec![Vec::with_capacity(data.nrows()); modalities.len()];
        for row in data.rows() {
            let mut offset = 0;
            for (dim, &m) in modalities.iter().enumerate() {
                let observed: Vec<usize> = row
                    .iter()
                    .skip(offset)
                    .take(m)
                    .map(|&v| v as usize)
                    .collect();
                ranks[dim].push(PartialRank::from_observed(&observed)?);
                offset += m;
            }
        }

        Ok(Self {
            modalities: modalities.to_vec(),
            ranks,
        })
    }

    /// Number of items of each dimension
    pub fn modalities(&self) -> &[usize] {
        &self.modalities
    }

    /// Number of dimensions
    pub fn n_dims(&self) -> usize {
        self.modalities.len()
    }

    /// Number of subjects
    pub fn n_samples(&self) -> usize {
        self.ranks.first().map_or(0, Vec::len)
    }

    /// Rankings of one dimension
    pub fn dim(&self, dim: usize) -> &[PartialRank] {
        &self.ranks[dim]
    }

    /// Mutable rankings of one dimension
    pub fn dim_mut(&mut self, dim: usize) -> &mut [PartialRank] {
        &mut self.ranks[dim]
    }

    /// Whether any ranking is partial
    pub fn has_partial(&self) -> bool {
        self.ranks.iter().flatten().any(|r| r.is_partial)
    }

    /// Subjects with a partial ranking, per dimension
    pub fn partial_index(&self) -> Vec<Vec<usize>> {
        self.ranks
            .iter()
            .map(|dim| {
                dim.iter()
                    .enumerate()
                    .filter(|(_, r)| r.is_partial)
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect()
    }

    /// Current value of the partial rankings, `[dim][k]` following
    /// [`partial_index`](Self::partial_index)
    pub fn partial_ranks(&self, partial_index: &[Vec<usize>]) -> Vec<Vec<Vec<usize>>> {
        partial_index
            .iter()
            .enumerate()
            .map(|(dim, subjects)| {
                subjects
                    .iter()
                    .map(|&i| self.ranks[dim][i].rank.clone())
                    .collect()
            })
            .collect()
    }

    /// Write back partial rankings produced by
    /// [`partial_ranks`](Self::partial_ranks)
    pub fn set_partial_ranks(&mut self, partial_index: &[Vec<usize>], values: &[Vec<Vec<usize>>]) {
        for (dim, subjects) in partial_index.iter().enumerate() {
            for (&i, value) in subjects.iter().zip(values[dim].iter()) {
                self.ranks[dim][i].rank.clone_from(value);
            }
        }
    }

    /// Current presentation orders `[dim][subject]`
    pub fn presentation_orders(&self) -> Vec<Vec<Vec<usize>>> {
        self.ranks
            .iter()
            .map(|dim| dim.iter().map(|r| r.y.clone()).collect())
            .collect()
    }

    /// Replace every presentation order
    pub fn set_presentation_orders(&mut self, y: &[Vec<Vec<usize>>]) {
        for (dim, orders) in self.ranks.iter_mut().zip(y.iter()) {
            for (rank, order) in dim.iter_mut().zip(orders.iter()) {
                rank.y.clone_from(order);
            }
        }
    }

    /// Current rankings in the raw layout, unresolved positions as `0`
    pub fn to_array(&self) -> Array2<u32> {
        let n = self.n_samples();
        let width: usize = self.modalities.iter().sum();
        let mut out = Array2::zeros((n, width));

        for i in 0..n {
            let mut offset = 0;
            for (dim, &m) in self.modalities.iter().enumerate() {
                for (pos, &item) in self.ranks[dim][i].rank.iter().enumerate() {
                    out[[i, offset + pos]] = item as u32;
                }
                offset += m;
            }
        }

        out
    }
}

/// Check the number of items of every dimension.
pub fn validate_modalities(modalities: &[usize]) -> Result<()> {
    if modalities.is_empty() {
        return Err(Error::invalid_data("At least one ranking dimension is required"));
    }
    if let Some(dim) = modalities.iter().position(|&m| m < 2) {
        return Err(Error::invalid_data(format!(
            "dimension {dim} has fewer than 2 items"
        )));
    }
    if let Some(dim) = modalities.iter().position(|&m| m > 20) {
        return Err(Error::invalid_data(format!(
            "dimension {dim} has more than 20 items"
        )));
    }
    Ok(())
}
