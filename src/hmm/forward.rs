use ndarray::{Array1, Array2};

use super::model::HMM;
use crate::error::{HmmError, Result};

/// Scaled forward lattice of one observation sequence.
///
/// Row `t` holds `alpha[t]` normalised to sum to one; `scales[t]` is the
/// mass it had before the normalisation, so the log-likelihood of the
/// sequence is the sum of the log of the scales.
#[derive(Debug, Clone)]
pub struct ForwardLattice {
    alpha: Array2<f64>,
    scales: Array1<f64>,
}

impl ForwardLattice {

    pub fn alpha(&self) -> &Array2<f64> {
        &self.alpha
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    pub fn len(&self) -> usize {
        self.alpha.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.nrows() == 0
    }

    /// `log P(O | model)`, `-inf` when no state path can produce the sequence.
    pub fn log_likelihood(&self) -> f64 {
        self.scales.iter().map(|s| s.ln()).sum()
    }

    /// `P(O | model)`; underflows to zero for long sequences.
    pub fn likelihood(&self) -> f64 {
        self.log_likelihood().exp()
    }

    /// First time step at which every state has zero forward probability.
    pub fn degenerate_at(&self) -> Option<usize> {
        self.scales.iter().position(|&s| s == 0.0)
    }
}

pub fn forward(sequence: &Array1<usize>, hmm: &HMM) -> Result<ForwardLattice> {
    hmm.check_sequence(sequence)?;
    let mut alpha: Array2<f64> = Array2::zeros((sequence.len(), hmm.nstates()));
    let mut scales: Array1<f64> = Array1::zeros(sequence.len());

    for t in 0..sequence.len() {
        let bmul = hmm.emissions(sequence[t]);
        let new_values = if t == 0 {
            hmm.pi() * &bmul
        } else {
            alpha.row(t - 1).dot(hmm.a()) * &bmul
        };
        let s = new_values.sum();
        scales[t] = s;
        if s > 0.0 {
            alpha.row_mut(t).assign(&(new_values / s));
        }
    }
    Ok(ForwardLattice { alpha, scales })
}

pub fn log_likelihood(sequence: &Array1<usize>, hmm: &HMM) -> Result<f64> {
    Ok(forward(sequence, hmm)?.log_likelihood())
}

pub fn likelihood(sequence: &Array1<usize>, hmm: &HMM) -> Result<f64> {
    Ok(forward(sequence, hmm)?.likelihood())
}

pub fn corpus_log_likelihood(corpus: &[Array1<usize>], hmm: &HMM) -> Result<f64> {
    let mut total = 0.0;
    for (index, sequence) in corpus.iter().enumerate() {
        total += log_likelihood(sequence, hmm).map_err(|e| e.in_corpus(index))?;
    }
    Ok(total)
}

/// The forward recursion without any scaling.
///
/// Fails with `NumericUnderflow` as soon as a row of the raw lattice reaches
/// zero while the sequence still has a positive probability.
pub fn forward_unscaled(sequence: &Array1<usize>, hmm: &HMM) -> Result<Array2<f64>> {
    let degenerate_at = forward(sequence, hmm)?.degenerate_at();
    let mut alpha: Array2<f64> = Array2::zeros((sequence.len(), hmm.nstates()));

    for t in 0..sequence.len() {
        let bmul = hmm.emissions(sequence[t]);
        let new_values = if t == 0 {
            hmm.pi() * &bmul
        } else {
            alpha.row(t - 1).dot(hmm.a()) * &bmul
        };
        if new_values.sum() == 0.0 && degenerate_at.map_or(true, |d| t < d) {
            return Err(HmmError::NumericUnderflow { t });
        }
        alpha.row_mut(t).assign(&new_values);
    }
    Ok(alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    fn two_states() -> HMM {
        HMM::new(
            array![[0.7, 0.3], [0.4, 0.6]],
            array![[0.9, 0.1], [0.2, 0.8]],
            array![0.6, 0.4],
        ).unwrap()
    }

    #[test]
    fn unscaled_lattice_by_hand() {
        let alpha = forward_unscaled(&array![0, 1, 0], &two_states()).unwrap();
        assert_abs_diff_eq!(alpha[[0, 0]], 0.54, epsilon = 1e-15);
        assert_abs_diff_eq!(alpha[[0, 1]], 0.08, epsilon = 1e-15);
        assert_abs_diff_eq!(alpha[[1, 0]], 0.041, epsilon = 1e-15);
        assert_abs_diff_eq!(alpha[[1, 1]], 0.168, epsilon = 1e-15);
        assert_abs_diff_eq!(alpha[[2, 0]], 0.08631, epsilon = 1e-15);
        assert_abs_diff_eq!(alpha[[2, 1]], 0.02262, epsilon = 1e-15);
    }

    #[test]
    fn likelihood_matches_the_last_unscaled_row() {
        let hmm = two_states();
        let sequence = array![0, 1, 0];
        let alpha = forward_unscaled(&sequence, &hmm).unwrap();
        let p = likelihood(&sequence, &hmm).unwrap();
        assert_abs_diff_eq!(p, alpha.row(2).sum(), epsilon = 1e-12);
        assert_abs_diff_eq!(p, 0.10893, epsilon = 1e-12);
        assert_abs_diff_eq!(log_likelihood(&sequence, &hmm).unwrap(), 0.10893f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn scaled_rows_are_normalised() {
        let hmm = two_states();
        let sequence = array![0, 1, 1, 0, 1, 0, 0];
        let lattice = forward(&sequence, &hmm).unwrap();
        let raw = forward_unscaled(&sequence, &hmm).unwrap();
        let mut mass = 1.0;
        for t in 0..sequence.len() {
            assert_abs_diff_eq!(lattice.alpha().row(t).sum(), 1.0, epsilon = 1e-12);
            mass *= lattice.scales()[t];
            for i in 0..2 {
                assert_abs_diff_eq!(lattice.alpha()[[t, i]] * mass, raw[[t, i]], epsilon = 1e-15);
            }
        }
        assert_eq!(lattice.degenerate_at(), None);
    }

    #[test]
    fn long_sequences_underflow_only_without_scaling() {
        let hmm = two_states();
        let sequence = Array1::from_shape_fn(3000, |t| (t / 3) % 2);
        let ll = log_likelihood(&sequence, &hmm).unwrap();
        assert!(ll.is_finite());
        assert!(ll < -700.0);
        assert!(matches!(forward_unscaled(&sequence, &hmm), Err(HmmError::NumericUnderflow { .. })));
    }

    #[test]
    fn impossible_sequence_has_zero_likelihood() {
        let hmm = HMM::new(
            array![[0.5, 0.5], [0.5, 0.5]],
            array![[1.0, 0.0], [1.0, 0.0]],
            array![0.5, 0.5],
        ).unwrap();
        let sequence = array![0, 1, 0];
        let lattice = forward(&sequence, &hmm).unwrap();
        assert_eq!(lattice.degenerate_at(), Some(1));
        assert_eq!(lattice.log_likelihood(), f64::NEG_INFINITY);
        assert_eq!(likelihood(&sequence, &hmm).unwrap(), 0.0);

        let raw = forward_unscaled(&sequence, &hmm).unwrap();
        assert_eq!(raw.sum_axis(Axis(1)), array![1.0, 0.0, 0.0]);
    }

    #[test]
    fn invalid_sequences() {
        let hmm = two_states();
        assert!(matches!(forward(&Array1::zeros(0), &hmm), Err(HmmError::EmptySequence)));
        assert!(matches!(
            likelihood(&array![0, 3], &hmm),
            Err(HmmError::InvalidObservation { t: 1, symbol: 3, .. })
        ));
    }

    #[test]
    fn corpus_errors_name_the_sequence() {
        let hmm = two_states();
        let corpus = vec![array![0, 1], array![1, 5]];
        match corpus_log_likelihood(&corpus, &hmm) {
            Err(HmmError::Corpus { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
