//! Random initialization of the SEM state

use crate::data::RankData;
use crate::isr::MixtureParameters;
use rand::prelude::*;

/// Uniform random permutation of `1..=m`
pub fn random_permutation<R: Rng + ?Sized>(m: usize, rng: &mut R) -> Vec<usize> {
    let mut perm: Vec<usize> = (1..=m).collect();
    perm.shuffle(rng);
    perm
}

/// Uniform random labels and the matching empirical proportions
pub fn random_partition<R: Rng + ?Sized>(
    n_samples: usize,
    n_clusters: usize,
    rng: &mut R,
) -> (Vec<usize>, Vec<f64>) {
    let z: Vec<usize> = (0..n_samples)
        .map(|_| rng.gen_range(0..n_clusters))
        .collect();

    let mut proportion = vec![0.0; n_clusters];
    for &k in &z {
        proportion[k] += 1.0;
    }
    for value in proportion.iter_mut() {
        *value /= n_samples as f64;
    }

    (z, proportion)
}

/// Random reference orderings and dispersions in `[0.5, 1)`
pub fn random_parameters<R: Rng + ?Sized>(
    modalities: &[usize],
    proportion: Vec<f64>,
    rng: &mut R,
) -> MixtureParameters {
    let n_clusters = proportion.len();
    let mut mu = Vec::with_capacity(modalities.len());
    let mut p = Vec::with_capacity(modalities.len());

    for &m in modalities {
        let mut p_dim = Vec::with_capacity(n_clusters);
        let mut mu_dim = Vec::with_capacity(n_clusters);
        for _ in 0..n_clusters {
            p_dim.push(rng.gen_range(0.5..1.0));
            mu_dim.push(random_permutation(m, rng));
        }
        p.push(p_dim);
        mu.push(mu_dim);
    }

    MixtureParameters { mu, p, proportion }
}

/// Random presentation orders for every subject, and a random completion of
/// every partial ranking using its missing items.
pub fn randomize_latent<R: Rng + ?Sized>(data: &mut RankData, rng: &mut R) {
    for dim in 0..data.n_dims() {
        let m = data.modalities()[dim];
        for rank in data.dim_mut(dim).iter_mut() {
            rank.y = random_permutation(m, rng);

            if rank.is_partial {
                let mut slots = rank.missing_index.clone();
                slots.shuffle(rng);
                for (&pos, &item) in slots.iter().zip(rank.missing_data.iter()) {
                    rank.rank[pos] = item;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_random_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut perm = random_permutation(6, &mut rng);
        perm.sort_unstable();
        assert_eq!(perm, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_random_partition() {
        let mut rng = StdRng::seed_from_u64(42);
        let (z, proportion) = random_partition(50, 3, &mut rng);

        assert_eq!(z.len(), 50);
        assert!(z.iter().all(|&k| k < 3));
        assert!((proportion.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_random_parameters() {
        let mut rng = StdRng::seed_from_u64(42);
        let params = random_parameters(&[4, 3], vec![0.5, 0.5], &mut rng);

        assert_eq!(params.n_dims(), 2);
        assert_eq!(params.n_clusters(), 2);
        assert_eq!(params.mu[1][0].len(), 3);
        assert!(params.p.iter().flatten().all(|&p| (0.5..1.0).contains(&p)));
    }

    #[test]
    fn test_randomize_latent_completes_partial_ranks() {
        let data = Array2::from_shape_vec((2, 4), vec![0, 2, 0, 0, 4, 3, 2, 1]).unwrap();
        let mut ranks = RankData::from_array(data.view(), &[4]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        randomize_latent(&mut ranks, &mut rng);

        let partial = &ranks.dim(0)[0];
        assert!(partial.is_complete());
        assert_eq!(partial.rank[1], 2);
        assert_eq!(ranks.dim(0)[1].rank, vec![4, 3, 2, 1]);
        assert!(ranks.dim(0).iter().all(|r| r.y.len() == 4));
    }
}
