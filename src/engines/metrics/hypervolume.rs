// src/engines/metrics/hypervolume.rs
//! Exact hypervolume indicator by recursive slicing over objectives.
//!
//! Fitness values are first turned into a minimization problem by negating
//! the weighted values, the same transformation applied to the worst-case
//! objective bounds to obtain the reference point. Points that do not
//! strictly dominate the reference point contribute nothing.

/// Reference point in the minimization space for the given worst-case values
pub fn reference_point(worst: &[f64], weights: &[f64]) -> Vec<f64> {
    worst
        .iter()
        .zip(weights)
        .map(|(v, w)| -(v * w))
        .collect()
}

/// Hypervolume of `fitness` rows (raw objective values) under `weights`
pub fn hypervolume(fitness: &[Vec<f64>], weights: &[f64], reference: &[f64]) -> f64 {
    let points: Vec<Vec<f64>> = fitness
        .iter()
        .map(|row| row.iter().zip(weights).map(|(v, w)| -(v * w)).collect::<Vec<f64>>())
        .filter(|p: &Vec<f64>| {
            p.len() == reference.len() && p.iter().zip(reference).all(|(v, r)| v < r)
        })
        .collect();

    if points.is_empty() || reference.is_empty() {
        return 0.0;
    }

    slice_volume(points, reference)
}

fn slice_volume(mut points: Vec<Vec<f64>>, reference: &[f64]) -> f64 {
    let dims = reference.len();
    if points.is_empty() {
        return 0.0;
    }

    if dims == 1 {
        let best = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
        return reference[0] - best;
    }

    let last = dims - 1;
    points.sort_by(|a, b| a[last].partial_cmp(&b[last]).unwrap_or(std::cmp::Ordering::Equal));

    if dims == 2 {
        // Staircase sweep; points sorted by second objective
        let mut volume = 0.0;
        let mut best_x = reference[0];
        for p in &points {
            if p[0] < best_x {
                volume += (best_x - p[0]) * (reference[1] - p[1]);
                best_x = p[0];
            }
        }
        return volume;
    }

    let mut volume = 0.0;
    for i in 0..points.len() {
        let upper = points.get(i + 1).map(|p| p[last]).unwrap_or(reference[last]);
        let depth = upper - points[i][last];
        if depth <= 0.0 {
            continue;
        }
        let projected: Vec<Vec<f64>> = points[..=i].iter().map(|p| p[..last].to_vec()).collect();
        volume += slice_volume(projected, &reference[..last]) * depth;
    }
    volume
}
