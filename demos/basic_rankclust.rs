//! Basic rank clustering example
//!
//! Simulates rankings of five items from two ISR clusters, then compares fits
//! with one, two and three clusters using the BIC.

use ndarray::Array2;
use rand::prelude::*;
use rankclust::{rand_index, sample_isr, RankClust};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(2024);
    let groups: [(&[usize], f64, usize); 2] =
        [(&[1, 2, 3, 4, 5], 0.9, 60), (&[5, 3, 1, 2, 4], 0.85, 40)];

    let mut values = Vec::new();
    let mut truth = Vec::new();
    for (k, &(mu, p, count)) in groups.iter().enumerate() {
        for _ in 0..count {
            values.extend(sample_isr(mu, p, &mut rng).into_iter().map(|v| v as u32));
            truth.push(k);
        }
    }
    let data = Array2::from_shape_vec((truth.len(), 5), values)?;

    println!("Sample data shape: {:?}", data.dim());
    println!("First few rows:");
    for i in 0..3 {
        println!("  {:?}", data.row(i).to_vec());
    }
    println!();

    let mut best = None;
    for n_clusters in 1..=3 {
        println!("=== {} cluster(s) ===", n_clusters);
        let model = RankClust::new(n_clusters)
            .max_iter(60)
            .burn_in(10)
            .n_init(3)
            .random_state(42);

        match model.fit(data.view(), &[5]) {
            Ok(result) => {
                println!("Log-likelihood: {:.3}", result.log_likelihood);
                println!("BIC: {:.3}", result.bic);
                println!(
                    "Rand index against the simulated partition: {:.3}",
                    rand_index(&result.labels.to_vec(), &truth)
                );
                result.write_parameters(&mut std::io::stdout())?;

                let better = best
                    .as_ref()
                    .map_or(true, |(_, bic)| result.bic < *bic);
                if better {
                    best = Some((n_clusters, result.bic));
                }
            }
            Err(err) => println!("Fit failed: {}", err),
        }
        println!();
    }

    if let Some((n_clusters, bic)) = best {
        println!("Selected {} cluster(s) (BIC {:.3})", n_clusters, bic);
    }

    Ok(())
}
