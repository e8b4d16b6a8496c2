use crate::engines::generation::individual::Individual;
use rand::Rng;

/// Distribution index used when the offspring pool is too small to mate
pub const NOMINAL_ETA: f64 = 1.0;

/// Parent values closer than this are treated as identical by crossover
const SBX_EPSILON: f64 = 1e-14;

/// Uniform random genome within `[low_i, up_i]`
pub fn random_genome<R: Rng>(low: &[f64], up: &[f64], rng: &mut R) -> Vec<f64> {
    low.iter()
        .zip(up)
        .map(|(&xl, &xu)| xl + rng.gen::<f64>() * (xu - xl))
        .collect()
}

/// Bounded simulated binary crossover, applied in place to both parents.
///
/// Each position is considered with probability 0.5. Positions whose parent
/// values differ by more than a negligible epsilon get two children values
/// spread according to `eta`, clamped to the bounds and randomly assigned to
/// the two individuals; other positions are left untouched.
pub fn sbx_bounded<R: Rng>(
    ind1: &mut [f64],
    ind2: &mut [f64],
    eta: f64,
    low: &[f64],
    up: &[f64],
    rng: &mut R,
) {
    let size = ind1.len().min(ind2.len()).min(low.len()).min(up.len());
    let exponent = 1.0 / (eta + 1.0);

    for i in 0..size {
        if rng.gen::<f64>() > 0.5 {
            continue;
        }
        if (ind1[i] - ind2[i]).abs() <= SBX_EPSILON {
            continue;
        }

        let (xl, xu) = (low[i], up[i]);
        let x1 = ind1[i].min(ind2[i]);
        let x2 = ind1[i].max(ind2[i]);
        let u = rng.gen::<f64>();

        let spread = |beta: f64| {
            let alpha = 2.0 - beta.powf(-(eta + 1.0));
            if u <= 1.0 / alpha {
                (u * alpha).powf(exponent)
            } else {
                (1.0 / (2.0 - u * alpha)).powf(exponent)
            }
        };

        let beta_q = spread(1.0 + 2.0 * (x1 - xl) / (x2 - x1));
        let c1 = 0.5 * (x1 + x2 - beta_q * (x2 - x1));

        let beta_q = spread(1.0 + 2.0 * (xu - x2) / (x2 - x1));
        let c2 = 0.5 * (x1 + x2 + beta_q * (x2 - x1));

        let c1 = c1.max(xl).min(xu);
        let c2 = c2.max(xl).min(xu);

        if rng.gen::<f64>() <= 0.5 {
            ind1[i] = c2;
            ind2[i] = c1;
        } else {
            ind1[i] = c1;
            ind2[i] = c2;
        }
    }
}

/// Bounded polynomial mutation, each position perturbed with probability `indpb`
pub fn polynomial_mutation_bounded<R: Rng>(
    genome: &mut [f64],
    eta: f64,
    low: &[f64],
    up: &[f64],
    indpb: f64,
    rng: &mut R,
) {
    let mut_pow = 1.0 / (eta + 1.0);

    for (i, x) in genome.iter_mut().enumerate().take(low.len().min(up.len())) {
        if rng.gen::<f64>() > indpb {
            continue;
        }

        let (xl, xu) = (low[i], up[i]);
        let range = xu - xl;
        if range <= 0.0 {
            *x = xl;
            continue;
        }

        let delta_1 = (*x - xl) / range;
        let delta_2 = (xu - *x) / range;
        let u = rng.gen::<f64>();

        let delta_q = if u < 0.5 {
            let xy = 1.0 - delta_1;
            let val = 2.0 * u + (1.0 - 2.0 * u) * xy.powf(eta + 1.0);
            val.powf(mut_pow) - 1.0
        } else {
            let xy = 1.0 - delta_2;
            let val = 2.0 * (1.0 - u) + 2.0 * (u - 0.5) * xy.powf(eta + 1.0);
            1.0 - val.powf(mut_pow)
        };

        *x = (*x + delta_q * range).max(xl).min(xu);
    }
}

/// Apply crossover and mutation to a cloned survivor pool.
///
/// Offspring are mated in consecutive pairs; pair `i` uses `i` as its
/// distribution index. A pair whose crossover draw fails passes through with
/// its fitness intact. A pool with a single member is only mutated.
pub fn vary<R: Rng>(
    offspring: &mut [Individual],
    crossover_rate: f64,
    mutation_rate: f64,
    low: &[f64],
    up: &[f64],
    rng: &mut R,
) {
    if offspring.len() < 2 {
        if let Some(only) = offspring.first_mut() {
            polynomial_mutation_bounded(&mut only.genes, NOMINAL_ETA, low, up, mutation_rate, rng);
            only.fitness.invalidate();
        }
        return;
    }

    for (pair_index, pair) in offspring.chunks_exact_mut(2).enumerate() {
        if rng.gen::<f64>() > crossover_rate {
            continue;
        }

        let eta = pair_index as f64;
        let (first, second) = pair.split_at_mut(1);
        let (ind1, ind2) = (&mut first[0], &mut second[0]);

        sbx_bounded(&mut ind1.genes, &mut ind2.genes, eta, low, up, rng);
        polynomial_mutation_bounded(&mut ind1.genes, eta, low, up, mutation_rate, rng);
        polynomial_mutation_bounded(&mut ind2.genes, eta, low, up, mutation_rate, rng);

        ind1.fitness.invalidate();
        ind2.fitness.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::individual::Fitness;
    use crate::types::Provenance;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn in_bounds(genome: &[f64], low: &[f64], up: &[f64]) -> bool {
        genome
            .iter()
            .zip(low.iter().zip(up))
            .all(|(x, (l, u))| x >= l && x <= u)
    }

    #[test]
    fn test_random_genome_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let low = [0.0, -5.0, 10.0];
        let up = [1.0, 5.0, 10.5];
        for _ in 0..200 {
            let genome = random_genome(&low, &up, &mut rng);
            assert!(in_bounds(&genome, &low, &up));
        }
    }

    #[test]
    fn test_sbx_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let low = [0.0, -1.0, 100.0];
        let up = [1.0, 1.0, 200.0];
        for eta in 0..20 {
            let mut a = random_genome(&low, &up, &mut rng);
            let mut b = random_genome(&low, &up, &mut rng);
            sbx_bounded(&mut a, &mut b, eta as f64, &low, &up, &mut rng);
            assert!(in_bounds(&a, &low, &up));
            assert!(in_bounds(&b, &low, &up));
        }
    }

    #[test]
    fn test_sbx_identical_parents_unchanged() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = vec![0.3, 0.6];
        let mut b = vec![0.3, 0.6];
        sbx_bounded(&mut a, &mut b, 5.0, &[0.0, 0.0], &[1.0, 1.0], &mut rng);
        assert_eq!(a, vec![0.3, 0.6]);
        assert_eq!(b, vec![0.3, 0.6]);
    }

    #[test]
    fn test_mutation_respects_bounds_at_edges() {
        let mut rng = StdRng::seed_from_u64(3);
        let low = [0.0, 0.0];
        let up = [1.0, 1.0];
        for _ in 0..500 {
            let mut genome = vec![0.0, 1.0];
            polynomial_mutation_bounded(&mut genome, 0.0, &low, &up, 1.0, &mut rng);
            assert!(in_bounds(&genome, &low, &up));
        }
    }

    #[test]
    fn test_mutation_probability_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut genome = vec![0.25, 0.75];
        polynomial_mutation_bounded(&mut genome, 20.0, &[0.0, 0.0], &[1.0, 1.0], 0.0, &mut rng);
        assert_eq!(genome, vec![0.25, 0.75]);
    }

    fn evaluated(genes: Vec<f64>, index: usize) -> Individual {
        let mut ind = Individual::new(genes, Provenance::new(0, index));
        ind.fitness = Fitness::new(vec![0.5]);
        ind
    }

    #[test]
    fn test_vary_single_member_always_invalidated() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut pool = vec![evaluated(vec![0.5], 0)];
        vary(&mut pool, 1.0, 0.0, &[0.0], &[1.0], &mut rng);
        assert!(!pool[0].fitness.is_valid());
    }

    #[test]
    fn test_vary_without_crossover_keeps_fitness() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut pool: Vec<Individual> = (0..4).map(|i| evaluated(vec![i as f64 / 4.0], i)).collect();
        vary(&mut pool, 0.0, 1.0, &[0.0], &[1.0], &mut rng);
        assert!(pool.iter().all(|ind| ind.fitness.is_valid()));
    }

    #[test]
    fn test_vary_with_crossover_invalidates_pairs() {
        let mut rng = StdRng::seed_from_u64(9);
        let low = [0.0, 0.0];
        let up = [1.0, 1.0];
        let mut pool: Vec<Individual> = (0..5)
            .map(|i| evaluated(vec![i as f64 / 5.0, 1.0 - i as f64 / 5.0], i))
            .collect();
        vary(&mut pool, 1.0, 0.5, &low, &up, &mut rng);

        // Four mated, the odd one out passes through
        assert_eq!(pool.iter().filter(|ind| !ind.fitness.is_valid()).count(), 4);
        assert!(pool[4].fitness.is_valid());
        assert!(pool.iter().all(|ind| in_bounds(&ind.genes, &low, &up)));
    }
}
