use ndarray::{Array1, Array2};

use super::forward::{forward, ForwardLattice};
use super::model::HMM;
use crate::error::{HmmError, Result};

/// Backward lattice scaled with the coefficients of the forward pass, so
/// that `alpha[t] . beta[t]` equals one at every time step.
pub fn backward(sequence: &Array1<usize>, hmm: &HMM) -> Result<Array2<f64>> {
    let lattice = forward(sequence, hmm)?;
    backward_scaled(sequence, hmm, &lattice)
}

/// Backward pass reusing `forward`, which must be the lattice of `sequence`
/// under `hmm`.
pub(crate) fn backward_scaled(sequence: &Array1<usize>, hmm: &HMM, forward: &ForwardLattice) -> Result<Array2<f64>> {
    hmm.check_sequence(sequence)?;
    if forward.len() != sequence.len() {
        return Err(HmmError::LengthMismatch { expected: sequence.len(), found: forward.len() });
    }
    if forward.alpha().ncols() != hmm.nstates() {
        return Err(HmmError::InvalidModel(format!(
            "forward lattice over {} states for a model with {} states", forward.alpha().ncols(), hmm.nstates()
        )));
    }
    if let Some(t) = forward.degenerate_at() {
        return Err(HmmError::DegenerateSequence { t });
    }

    let scales = forward.scales();
    let len = sequence.len();
    let mut beta: Array2<f64> = Array2::zeros((len, hmm.nstates()));
    beta.row_mut(len - 1).fill(1.0);
    for t in (0..len - 1).rev() {
        let tmp = &beta.row(t + 1) * &hmm.emissions(sequence[t + 1]);
        let new_values = hmm.a().dot(&tmp) / scales[t + 1];
        beta.row_mut(t).assign(&new_values);
    }
    Ok(beta)
}

/// The backward recursion without any scaling.
///
/// Fails with `NumericUnderflow` when a row of the raw lattice reaches zero
/// although the sequence has a positive probability.
pub fn backward_unscaled(sequence: &Array1<usize>, hmm: &HMM) -> Result<Array2<f64>> {
    let possible = forward(sequence, hmm)?.degenerate_at().is_none();
    let len = sequence.len();
    let mut beta: Array2<f64> = Array2::zeros((len, hmm.nstates()));
    beta.row_mut(len - 1).fill(1.0);
    for t in (0..len - 1).rev() {
        let tmp = &beta.row(t + 1) * &hmm.emissions(sequence[t + 1]);
        let new_values = hmm.a().dot(&tmp);
        if possible && new_values.sum() == 0.0 {
            return Err(HmmError::NumericUnderflow { t });
        }
        beta.row_mut(t).assign(&new_values);
    }
    Ok(beta)
}
