use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::error::{HmmError, Result};

/// Maximum distance to 1 tolerated for the sum of a probability row.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Accepted rows further than this from 1 are renormalised before being stored.
const RENORMALISE_ABOVE: f64 = 1e-12;

pub(crate) fn log(p: f64) -> f64 {
    if p == 0.0 {
        f64::NEG_INFINITY
    } else {
        p.ln()
    }
}

/// A discrete hidden Markov model `(A, B, pi)`.
///
/// `a[[i, j]]` is the probability to move from state `i` to state `j`,
/// `b[[i, k]]` the probability for state `i` to emit symbol `k` and `pi[i]`
/// the probability to start in state `i`. Every row is a distribution; this
/// is checked once at construction and the parameters are never mutated
/// afterwards. Training builds a fresh model at each iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHmm")]
pub struct HMM {
    a: Array2<f64>,
    b: Array2<f64>,
    pi: Array1<f64>,
}

#[derive(Deserialize)]
struct RawHmm {
    a: Array2<f64>,
    b: Array2<f64>,
    pi: Array1<f64>,
}

impl TryFrom<RawHmm> for HMM {
    type Error = HmmError;

    fn try_from(raw: RawHmm) -> Result<Self> {
        HMM::new(raw.a, raw.b, raw.pi)
    }
}

fn check_distribution(name: &str, mut row: ArrayViewMut1<f64>) -> Result<()> {
    if let Some(p) = row.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(HmmError::InvalidModel(format!("{} contains the invalid probability {}", name, p)));
    }
    let s = row.sum();
    if (s - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(HmmError::InvalidModel(format!("{} sums to {}, expected 1", name, s)));
    }
    if (s - 1.0).abs() > RENORMALISE_ABOVE {
        row /= s;
    }
    Ok(())
}

impl HMM {

    /// Rows within `ROW_SUM_TOLERANCE` of a distribution are accepted and
    /// stored renormalised.
    pub fn new(mut a: Array2<f64>, mut b: Array2<f64>, mut pi: Array1<f64>) -> Result<Self> {
        let nstates = pi.len();
        if nstates == 0 {
            return Err(HmmError::InvalidModel("the model needs at least one state".into()));
        }
        if b.ncols() == 0 {
            return Err(HmmError::InvalidModel("the model needs at least one observation symbol".into()));
        }
        if a.dim() != (nstates, nstates) {
            return Err(HmmError::InvalidModel(format!(
                "A has shape {:?} but the model has {} states", a.dim(), nstates
            )));
        }
        if b.nrows() != nstates {
            return Err(HmmError::InvalidModel(format!(
                "B has {} rows but the model has {} states", b.nrows(), nstates
            )));
        }

        for (state, row) in a.axis_iter_mut(Axis(0)).enumerate() {
            check_distribution(&format!("row {} of A", state), row)?;
        }
        for (state, row) in b.axis_iter_mut(Axis(0)).enumerate() {
            check_distribution(&format!("row {} of B", state), row)?;
        }
        check_distribution("pi", pi.view_mut())?;

        Ok(Self { a, b, pi })
    }

    pub fn nstates(&self) -> usize {
        self.a.nrows()
    }

    pub fn nobs(&self) -> usize {
        self.b.ncols()
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }

    pub fn pi(&self) -> &Array1<f64> {
        &self.pi
    }

    /// Probabilities of every state to emit `obs`.
    pub fn emissions(&self, obs: usize) -> ArrayView1<f64> {
        self.b.column(obs)
    }

    /// Same model with the emission matrix replaced by `b`.
    pub fn with_emissions(&self, b: Array2<f64>) -> Result<Self> {
        HMM::new(self.a.clone(), b, self.pi.clone())
    }

    /// Fails if `sequence` is empty or uses a symbol outside the alphabet.
    pub fn check_sequence(&self, sequence: &Array1<usize>) -> Result<()> {
        if sequence.is_empty() {
            return Err(HmmError::EmptySequence);
        }
        let nobs = self.nobs();
        match sequence.iter().position(|&o| o >= nobs) {
            Some(t) => Err(HmmError::InvalidObservation { t, symbol: sequence[t], nobs }),
            None => Ok(()),
        }
    }

    pub(crate) fn log_init_prob(&self, obs: usize) -> Array1<f64> {
        self.pi.mapv(log) + self.emissions(obs).mapv(log)
    }

    pub(crate) fn log_transitions(&self) -> Array2<f64> {
        self.a.mapv(log)
    }

    pub(crate) fn log_emissions(&self) -> Array2<f64> {
        self.b.mapv(log)
    }
}
