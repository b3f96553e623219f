use ndarray::{Array1, Array2};
use ndarray_stats::QuantileExt;

use super::model::{log, HMM};
use crate::error::{HmmError, Result};

/// Most probable state path of an observation sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub states: Array1<usize>,
    pub log_probability: f64,
}

/// Log-domain Viterbi decoder bound to one model.
///
/// The log parameters are computed once, which pays off when decoding a
/// whole corpus with the same model.
pub struct Viterbi<'a> {
    hmm: &'a HMM,
    log_a: Array2<f64>,
    log_b: Array2<f64>,
}

impl<'a> Viterbi<'a> {

    pub fn new(hmm: &'a HMM) -> Self {
        Self { hmm, log_a: hmm.log_transitions(), log_b: hmm.log_emissions() }
    }

    pub fn decode(&self, sequence: &Array1<usize>) -> Result<Path> {
        self.hmm.check_sequence(sequence)?;
        let len = sequence.len();
        let nstates = self.hmm.nstates();
        let mut viterbi_array = Array2::from_elem((len, nstates), f64::NEG_INFINITY);
        let mut viterbi_bt: Array2<usize> = Array2::zeros((len, nstates));

        viterbi_array.row_mut(0).assign(&self.hmm.log_init_prob(sequence[0]));

        for t in 1..len {
            for state_to in 0..nstates {
                let emit_prob = self.log_b[[state_to, sequence[t]]];
                if emit_prob > f64::NEG_INFINITY {
                    let probs = &viterbi_array.row(t - 1) + &self.log_a.column(state_to);
                    // argmax keeps the first maximum, ties go to the smallest state
                    let state_from = probs.argmax().map_err(|_| HmmError::DegenerateSequence { t })?;
                    viterbi_array[[t, state_to]] = probs[state_from] + emit_prob;
                    viterbi_bt[[t, state_to]] = state_from;
                }
            }
        }

        let mut end_state = viterbi_array.row(len - 1).argmax().map_err(|_| HmmError::DegenerateSequence { t: len - 1 })?;
        let log_probability = viterbi_array[[len - 1, end_state]];
        if log_probability == f64::NEG_INFINITY {
            let t = viterbi_array.outer_iter()
                .position(|row| row.iter().all(|&p| p == f64::NEG_INFINITY))
                .unwrap_or(len - 1);
            return Err(HmmError::DegenerateSequence { t });
        }

        let mut states: Array1<usize> = Array1::zeros(len);
        states[len - 1] = end_state;
        for t in (0..len - 1).rev() {
            end_state = viterbi_bt[[t + 1, end_state]];
            states[t] = end_state;
        }
        Ok(Path { states, log_probability })
    }
}

/// Most probable state path of `sequence` under `hmm`.
pub fn decode(sequence: &Array1<usize>, hmm: &HMM) -> Result<Path> {
    Viterbi::new(hmm).decode(sequence)
}

pub fn path_log_probability(path: &Array1<usize>, sequence: &Array1<usize>, hmm: &HMM) -> Result<f64> {
    hmm.check_sequence(sequence)?;
    if path.len() != sequence.len() {
        return Err(HmmError::LengthMismatch { expected: sequence.len(), found: path.len() });
    }
    let nstates = hmm.nstates();
    if let Some(t) = path.iter().position(|&s| s >= nstates) {
        return Err(HmmError::InvalidState { t, state: path[t], nstates });
    }

    let mut p = log(hmm.pi()[path[0]]) + log(hmm.b()[[path[0], sequence[0]]]);
    for t in 1..path.len() {
        p += log(hmm.a()[[path[t - 1], path[t]]]) + log(hmm.b()[[path[t], sequence[t]]]);
    }
    Ok(p)
}

/// `P(Q, O | model)` for a candidate path `Q`.
pub fn path_probability(path: &Array1<usize>, sequence: &Array1<usize>, hmm: &HMM) -> Result<f64> {
    Ok(path_log_probability(path, sequence, hmm)?.exp())
}
