//! Density estimation and ratio-scored candidate selection

use rand::Rng;

/// A candidate value with its density-ratio score
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scored {
    pub value: f64,
    pub ratio: f64,
}

/// Gaussian-kernel mixture density at `x`
pub(crate) fn kde_score(x: f64, values: &[f64], bandwidth: f64) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values
        .iter()
        .map(|&v| (-(x - v).powi(2) / (2.0 * bandwidth.powi(2))).exp())
        .sum::<f64>()
        / values.len() as f64
}

/// Draw candidates from the good-subset KDE and score each by l(x)/g(x).
///
/// Candidates are returned unranked; the caller applies the argmax and the
/// exploration tie-break.
pub(crate) fn continuous_candidates<R: Rng>(
    good_values: &[f64],
    bad_values: &[f64],
    low: f64,
    high: f64,
    bandwidth_scale: f64,
    n_candidates: usize,
    rng: &mut R,
) -> Vec<Scored> {
    if good_values.is_empty() {
        let v = low + rng.random::<f64>() * (high - low);
        return vec![Scored { value: v, ratio: 1.0 }];
    }

    let bandwidth = bandwidth_scale * (high - low) / 10.0;
    let mut candidates = Vec::with_capacity(n_candidates);

    for _ in 0..n_candidates {
        // Kernel centered at a random good observation, Box-Muller noise
        let idx = (rng.random::<f64>() * good_values.len() as f64).floor() as usize;
        let base = good_values[idx.min(good_values.len() - 1)];
        let u1: f64 = rng.random::<f64>().max(1e-10);
        let u2: f64 = rng.random::<f64>();
        let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * bandwidth;
        let value = (base + noise).clamp(low, high);

        let l = kde_score(value, good_values, bandwidth);
        let g = kde_score(value, bad_values, bandwidth);
        candidates.push(Scored { value, ratio: l / (g + 1e-10) });
    }

    candidates
}

/// Laplace-smoothed occupancy over `n_bins` indexed slots
pub(crate) fn smoothed_counts(indices: &[usize], n_bins: usize) -> Vec<f64> {
    let mut counts = vec![1.0; n_bins];
    for &i in indices {
        if i < n_bins {
            counts[i] += 1.0;
        }
    }
    counts
}

/// Draw candidate slot indices from the good-count distribution and score
/// each by the count ratio good/bad.
pub(crate) fn indexed_candidates<R: Rng>(
    good_indices: &[usize],
    bad_indices: &[usize],
    n_bins: usize,
    n_candidates: usize,
    rng: &mut R,
) -> Vec<(usize, f64)> {
    if n_bins == 0 {
        return Vec::new();
    }
    if good_indices.is_empty() {
        let idx = (rng.random::<f64>() * n_bins as f64).floor() as usize;
        return vec![(idx.min(n_bins - 1), 1.0)];
    }

    let good = smoothed_counts(good_indices, n_bins);
    let bad = smoothed_counts(bad_indices, n_bins);
    let total: f64 = good.iter().sum();

    let mut candidates = Vec::with_capacity(n_candidates);
    for _ in 0..n_candidates {
        // Inverse-CDF draw from the smoothed good distribution
        let r: f64 = rng.random::<f64>() * total;
        let mut cumsum = 0.0;
        let mut idx = n_bins - 1;
        for (i, &c) in good.iter().enumerate() {
            cumsum += c;
            if r < cumsum {
                idx = i;
                break;
            }
        }
        candidates.push((idx, good[idx] / bad[idx]));
    }
    candidates
}

/// Argmax by ratio with an exploration tie-break: among candidates whose
/// ratio ties the maximum (within `tie_eps`), prefer the one with the
/// largest minimum normalized distance to previously evaluated points.
pub(crate) fn pick_best<F>(candidates: &[(f64, f64)], tie_eps: f64, min_dist: F) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let best_ratio = candidates
        .iter()
        .map(|&(_, r)| r)
        .fold(f64::NEG_INFINITY, f64::max);
    if best_ratio == f64::NEG_INFINITY {
        return None;
    }

    candidates
        .iter()
        .filter(|&&(_, r)| (best_ratio - r) <= tie_eps)
        .map(|&(v, _)| v)
        .max_by(|a, b| {
            min_dist(*a)
                .partial_cmp(&min_dist(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
