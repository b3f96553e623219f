use ndarray::{s, Array1, Array2, Array3, Axis};

use super::backward::backward_scaled;
use super::forward::forward;
use super::model::HMM;
use crate::error::{HmmError, Result};

/// State posteriors of one sequence.
///
/// `gamma[[t, i]]` is the probability to be in state `i` at time `t` and
/// `xi[[t, i, j]]` the probability to move from `i` to `j` between `t` and
/// `t + 1`, both given the whole sequence.
#[derive(Debug, Clone)]
pub struct Posteriors {
    pub gamma: Array2<f64>,
    pub xi: Array3<f64>,
    pub log_likelihood: f64,
}

pub fn posteriors(sequence: &Array1<usize>, hmm: &HMM) -> Result<Posteriors> {
    let lattice = forward(sequence, hmm)?;
    if let Some(t) = lattice.degenerate_at() {
        return Err(HmmError::DegenerateSequence { t });
    }
    let betas = backward_scaled(sequence, hmm, &lattice)?;
    let alphas = lattice.alpha();

    let len = sequence.len();
    let nstates = hmm.nstates();
    let mut gammas: Array2<f64> = Array2::zeros((len, nstates));
    let mut xis: Array3<f64> = Array3::zeros((len - 1, nstates, nstates));

    for t in 0..len - 1 {
        let bmul = hmm.emissions(sequence[t + 1]);
        for state in 0..nstates {
            let r = alphas[[t, state]] * &hmm.a().row(state) * &betas.row(t + 1) * &bmul;
            xis.slice_mut(s![t, state, ..]).assign(&r);
        }
        let norm = xis.slice(s![t, .., ..]).sum();
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(HmmError::DegenerateSequence { t });
        }
        xis.slice_mut(s![t, .., ..]).mapv_inplace(|x| x / norm);
        let gamma_t = xis.slice(s![t, .., ..]).sum_axis(Axis(1));
        gammas.row_mut(t).assign(&gamma_t);
    }

    let r = &alphas.row(len - 1) * &betas.row(len - 1);
    let norm = r.sum();
    if !(norm > 0.0 && norm.is_finite()) {
        return Err(HmmError::DegenerateSequence { t: len - 1 });
    }
    gammas.row_mut(len - 1).assign(&(r / norm));

    Ok(Posteriors { gamma: gammas, xi: xis, log_likelihood: lattice.log_likelihood() })
}
