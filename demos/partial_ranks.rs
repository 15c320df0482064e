//! Partial and multivariate rankings
//!
//! Each subject ranks two sets of items (four and three items). Some
//! positions are unknown and marked with `0`; the fit fills them in and
//! reports how the SEM iterations moved towards the final estimate.

use ndarray::Array2;
use rand::prelude::*;
use rankclust::{sample_isr, RankClust};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 60;

    let mut values = Vec::with_capacity(n * 7);
    for i in 0..n {
        let (first, second): (&[usize], &[usize]) = if i % 2 == 0 {
            (&[1, 2, 3, 4], &[1, 2, 3])
        } else {
            (&[4, 1, 3, 2], &[3, 2, 1])
        };
        let mut row: Vec<u32> = sample_isr(first, 0.9, &mut rng)
            .into_iter()
            .chain(sample_isr(second, 0.9, &mut rng))
            .map(|v| v as u32)
            .collect();

        // Hide the last two positions of the first ranking for every fifth subject
        if i % 5 == 0 {
            row[2] = 0;
            row[3] = 0;
        }
        values.extend(row);
    }
    let data = Array2::from_shape_vec((n, 7), values)?;

    let model = RankClust::new(2)
        .max_iter(60)
        .burn_in(15)
        .n_init(2)
        .random_state(42)
        .detail(true);

    let result = model.fit(data.view(), &[4, 3])?;
    result.write_parameters(&mut std::io::stdout())?;

    println!();
    println!("Completed partial rankings:");
    for i in (0..n).step_by(5).take(4) {
        println!(
            "  observed {:?} -> completed {:?}",
            data.row(i).to_vec(),
            result.completed.row(i).to_vec()
        );
    }

    if let Some(distances) = &result.distances {
        println!();
        println!("Rand index of the stored iterations against the final partition:");
        for (iteration, ri) in distances.partition.iter().enumerate().step_by(10) {
            println!("  iteration {:>3}: {:.3}", iteration, ri);
        }
    }

    Ok(())
}
