/// Pareto utilities for multi-objective calibration
/// Implements NSGA-II fast non-dominated sorting, crowding distance and survivor selection

use crate::engines::generation::individual::Individual;
use std::cmp::Ordering;

/// Check if objective vector A dominates objective vector B under `weights`.
/// A dominates B if `w_i * a_i >= w_i * b_i` for every objective and strictly
/// greater for at least one. Vectors of mismatched length never dominate.
pub fn dominates(a_objectives: &[f64], b_objectives: &[f64], weights: &[f64]) -> bool {
    if a_objectives.is_empty()
        || a_objectives.len() != b_objectives.len()
        || a_objectives.len() != weights.len()
    {
        return false;
    }

    let mut at_least_one_better = false;

    for i in 0..a_objectives.len() {
        let a_val = weights[i] * a_objectives[i];
        let b_val = weights[i] * b_objectives[i];

        if b_val > a_val {
            // B is better in this objective, so A does not dominate B
            return false;
        }

        if a_val > b_val {
            at_least_one_better = true;
        }
    }

    at_least_one_better
}

/// Fast non-dominated sorting (NSGA-II algorithm)
/// Returns indices grouped by Pareto front (0 = best) and stores each rank on the individual
pub fn fast_non_dominated_sort(individuals: &mut [Individual], weights: &[f64]) -> Vec<Vec<usize>> {
    let n = individuals.len();
    if n == 0 {
        return Vec::new();
    }

    // For each individual, track:
    // - domination_count: how many individuals dominate it
    // - dominated_solutions: indices of individuals it dominates
    let mut domination_count = vec![0usize; n];
    let mut dominated_solutions: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();

    let mut first_front = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }

            if dominates(individuals[i].objectives(), individuals[j].objectives(), weights) {
                dominated_solutions[i].push(j);
            } else if dominates(individuals[j].objectives(), individuals[i].objectives(), weights) {
                domination_count[i] += 1;
            }
        }

        if domination_count[i] == 0 {
            individuals[i].rank = 0;
            first_front.push(i);
        }
    }

    fronts.push(first_front);

    let mut front_index = 0;
    while front_index < fronts.len() && !fronts[front_index].is_empty() {
        let mut next_front = Vec::new();

        for &i in &fronts[front_index] {
            for &j in &dominated_solutions[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    individuals[j].rank = front_index + 1;
                    next_front.push(j);
                }
            }
        }

        // Keep members in input order inside a front
        next_front.sort_unstable();

        if !next_front.is_empty() {
            fronts.push(next_front);
        }
        front_index += 1;
    }

    fronts
}

/// Calculate crowding distance for individuals in a front
/// Boundary members of every objective get infinite distance, interior members
/// accumulate the normalized gap between their two neighbours
pub fn calculate_crowding_distance(individuals: &mut [Individual], front_indices: &[usize]) {
    let front_size = front_indices.len();
    if front_size == 0 {
        return;
    }

    if front_size <= 2 {
        for &idx in front_indices {
            individuals[idx].crowding_distance = f64::INFINITY;
        }
        return;
    }

    let num_objectives = individuals[front_indices[0]].objectives().len();

    for &idx in front_indices {
        individuals[idx].crowding_distance = 0.0;
    }

    for obj in 0..num_objectives {
        let mut sorted_indices: Vec<usize> = front_indices.to_vec();
        sorted_indices.sort_by(|&a, &b| {
            individuals[a].objectives()[obj]
                .partial_cmp(&individuals[b].objectives()[obj])
                .unwrap_or(Ordering::Equal)
        });

        individuals[sorted_indices[0]].crowding_distance = f64::INFINITY;
        individuals[sorted_indices[front_size - 1]].crowding_distance = f64::INFINITY;

        let min_val = individuals[sorted_indices[0]].objectives()[obj];
        let max_val = individuals[sorted_indices[front_size - 1]].objectives()[obj];
        let range = max_val - min_val;

        if range.abs() < 1e-10 {
            // All values are the same for this objective
            continue;
        }

        for i in 1..(front_size - 1) {
            let idx = sorted_indices[i];
            let prev_val = individuals[sorted_indices[i - 1]].objectives()[obj];
            let next_val = individuals[sorted_indices[i + 1]].objectives()[obj];

            individuals[idx].crowding_distance += (next_val - prev_val) / range;
        }
    }
}

/// NSGA-II environmental selection of `k` survivors from `pool`.
///
/// Whole fronts are taken in rank order; the first front that does not fit
/// is truncated by descending crowding distance, ties keeping pool order.
/// When `k >= pool.len()` the whole pool is returned, ordered front by front.
pub fn select_nsga2(mut pool: Vec<Individual>, k: usize, weights: &[f64]) -> Vec<Individual> {
    let fronts = fast_non_dominated_sort(&mut pool, weights);
    for front in &fronts {
        calculate_crowding_distance(&mut pool, front);
    }

    let mut chosen: Vec<usize> = Vec::with_capacity(k.min(pool.len()));
    for front in &fronts {
        if chosen.len() >= k {
            break;
        }
        let room = k - chosen.len();
        if front.len() <= room {
            chosen.extend_from_slice(front);
        } else {
            let mut by_distance = front.clone();
            // Stable sort, so equal distances keep input order
            by_distance.sort_by(|&a, &b| {
                pool[b]
                    .crowding_distance
                    .partial_cmp(&pool[a].crowding_distance)
                    .unwrap_or(Ordering::Equal)
            });
            chosen.extend_from_slice(&by_distance[..room]);
        }
    }

    let mut slots: Vec<Option<Individual>> = pool.into_iter().map(Some).collect();
    chosen
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}
