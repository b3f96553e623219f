use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::model::HMM;
use crate::error::{HmmError, Result};

fn weighted_rows(m: &Array2<f64>) -> Result<Vec<WeightedIndex<f64>>> {
    m.axis_iter(Axis(0))
        .map(|row| WeightedIndex::new(row.iter()).map_err(|e| HmmError::InvalidModel(e.to_string())))
        .collect()
}

impl HMM {

    /// Model whose rows of `A`, `B` and `pi` are drawn uniformly at random
    /// and then normalised.
    pub fn random<R: Rng + ?Sized>(nstates: usize, nobs: usize, rng: &mut R) -> Result<Self> {
        if nstates == 0 || nobs == 0 {
            return Err(HmmError::InvalidModel(format!(
                "cannot draw a model with {} states and {} symbols", nstates, nobs
            )));
        }
        let mut a = Array2::from_shape_fn((nstates, nstates), |_| rng.gen::<f64>());
        let mut b = Array2::from_shape_fn((nstates, nobs), |_| rng.gen::<f64>());
        let mut pi = Array1::from_shape_fn(nstates, |_| rng.gen::<f64>());
        for mut row in a.axis_iter_mut(Axis(0)) {
            let s = row.sum();
            row /= s;
        }
        for mut row in b.axis_iter_mut(Axis(0)) {
            let s = row.sum();
            row /= s;
        }
        let s = pi.sum();
        pi /= s;
        HMM::new(a, b, pi)
    }

    /// Samples a state path and its observations, both of length `len`.
    pub fn simulate<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Result<(Array1<usize>, Array1<usize>)> {
        let transitions = weighted_rows(self.a())?;
        let emissions = weighted_rows(self.b())?;
        let init = WeightedIndex::new(self.pi().iter()).map_err(|e| HmmError::InvalidModel(e.to_string()))?;

        let mut states: Array1<usize> = Array1::zeros(len);
        let mut observations: Array1<usize> = Array1::zeros(len);
        for t in 0..len {
            let state = if t == 0 {
                init.sample(rng)
            } else {
                transitions[states[t - 1]].sample(rng)
            };
            states[t] = state;
            observations[t] = emissions[state].sample(rng);
        }
        Ok((states, observations))
    }
}

/// Samples `count` observation sequences of length `len`.
pub fn simulate_corpus<R: Rng + ?Sized>(hmm: &HMM, count: usize, len: usize, rng: &mut R) -> Result<Vec<Array1<usize>>> {
    (0..count).map(|_| hmm.simulate(len, rng).map(|(_, o)| o)).collect()
}
