use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ConvError, Result};
use crate::types::AnnotatedFiles;

/// Turn per-bucket percentages into cumulative boundaries, e.g. `[30, 40, 30]` into
/// `[30, 70, 100]`.
pub fn cumulative_boundaries(percentages: &[u32]) -> Result<Vec<u32>> {
    let mut sum = 0;
    let mut boundaries = Vec::with_capacity(percentages.len());
    for &p in percentages {
        if p > 100 {
            return Err(ConvError::InvalidSplit {
                msg: format!("percentage {} is larger than 100", p),
            });
        }
        sum += p;
        boundaries.push(sum);
    }
    validate_boundaries(&boundaries)?;
    Ok(boundaries)
}

/// Check that the boundaries never decrease and end at exactly 100.
pub fn validate_boundaries(boundaries: &[u32]) -> Result<()> {
    if boundaries.windows(2).any(|w| w[1] < w[0]) {
        return Err(ConvError::InvalidSplit {
            msg: format!("boundaries {:?} are not cumulative", boundaries),
        });
    }
    match boundaries.last() {
        Some(100) => Ok(()),
        _ => Err(ConvError::InvalidSplit {
            msg: "the split percentages do not add up to 100".to_string(),
        }),
    }
}

/// Randomly split the data into one dataset per cumulative boundary.
///
/// Each file draws a number in [0, 100) and goes to the first bucket whose boundary exceeds it.
pub fn split_dataset<R: Rng + ?Sized>(
    data: AnnotatedFiles,
    boundaries: &[u32],
    rng: &mut R,
) -> Result<Vec<AnnotatedFiles>> {
    validate_boundaries(boundaries)?;

    // Allocate slightly more than the expected size for each bucket.
    let mut previous = 0;
    let mut datasets: Vec<AnnotatedFiles> = boundaries
        .iter()
        .map(|&b| {
            let share = (b - previous) as f64 / 100.0;
            previous = b;
            AnnotatedFiles::from(Vec::with_capacity(
                (1.05 * share * data.len() as f64) as usize,
            ))
        })
        .collect();

    for file in data {
        let draw = rng.gen_range(0..100);
        // The last boundary is 100, so a bucket is always found.
        let bucket = boundaries
            .iter()
            .position(|&b| draw < b)
            .unwrap_or(boundaries.len() - 1);
        datasets[bucket].push(file);
    }

    info!(
        "Split into buckets of {:?} files",
        datasets.iter().map(|d| d.len()).collect::<Vec<_>>()
    );
    Ok(datasets)
}

/// Like [`split_dataset`], seeded for reproducible splits or from entropy otherwise.
pub fn split_dataset_seeded(
    data: AnnotatedFiles,
    boundaries: &[u32],
    seed: Option<u64>,
) -> Result<Vec<AnnotatedFiles>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    split_dataset(data, boundaries, &mut rng)
}
