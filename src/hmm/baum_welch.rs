use ndarray::{s, Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::model::HMM;
use super::posterior::{posteriors, Posteriors};
use super::viterbi::Viterbi;
use crate::error::{HmmError, Result};

/// Largest decrease of the corpus log-likelihood between two iterations
/// that is still put down to rounding.
pub const MONOTONICITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub max_iterations: usize,
    /// Training stops at the first iteration improving the corpus
    /// log-likelihood by less than this.
    pub min_loglik_improvement: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self { max_iterations: 100, min_loglik_improvement: 1e-6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmStartOptions {
    /// Lowest probability an emission may get before renormalisation.
    pub floor: f64,
}

impl Default for WarmStartOptions {
    fn default() -> Self {
        Self { floor: 1e-3 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub model: HMM,
    pub initial_log_likelihood: f64,
    /// Corpus log-likelihood after each iteration.
    pub loglik_history: Vec<f64>,
    pub converged: bool,
}

/// Expected counts gathered over a set of sequences for one model.
///
/// Statistics of disjoint parts of a corpus add up, so they can be collected
/// independently and merged before re-estimation.
#[derive(Debug, Clone)]
pub struct SufficientStatistics {
    pi_num: Array1<f64>,
    a_num: Array2<f64>,
    a_den: Array1<f64>,
    b_num: Array2<f64>,
    b_den: Array1<f64>,
    log_likelihood: f64,
    nseqs: usize,
}

impl SufficientStatistics {

    pub fn new(nstates: usize, nobs: usize) -> Self {
        Self {
            pi_num: Array1::zeros(nstates),
            a_num: Array2::zeros((nstates, nstates)),
            a_den: Array1::zeros(nstates),
            b_num: Array2::zeros((nstates, nobs)),
            b_den: Array1::zeros(nstates),
            log_likelihood: 0.0,
            nseqs: 0,
        }
    }

    /// E-step over a whole corpus.
    pub fn collect(corpus: &[Array1<usize>], hmm: &HMM) -> Result<Self> {
        let mut stats = SufficientStatistics::new(hmm.nstates(), hmm.nobs());
        for (index, sequence) in corpus.iter().enumerate() {
            let post = posteriors(sequence, hmm).map_err(|e| e.in_corpus(index))?;
            stats.add(sequence, &post).map_err(|e| e.in_corpus(index))?;
        }
        Ok(stats)
    }

    fn nstates(&self) -> usize {
        self.pi_num.len()
    }

    fn nobs(&self) -> usize {
        self.b_num.ncols()
    }

    /// Adds the posteriors of `sequence`, as returned by `posteriors`.
    pub fn add(&mut self, sequence: &Array1<usize>, post: &Posteriors) -> Result<()> {
        let len = sequence.len();
        let nstates = self.nstates();
        let nobs = self.nobs();
        if len == 0 {
            return Err(HmmError::EmptySequence);
        }
        if let Some(t) = sequence.iter().position(|&o| o >= nobs) {
            return Err(HmmError::InvalidObservation { t, symbol: sequence[t], nobs });
        }
        if post.gamma.nrows() != len {
            return Err(HmmError::LengthMismatch { expected: len, found: post.gamma.nrows() });
        }
        if post.gamma.ncols() != nstates || post.xi.dim() != (len - 1, nstates, nstates) {
            return Err(HmmError::InvalidModel(format!(
                "posteriors over {} states for statistics over {} states", post.gamma.ncols(), nstates
            )));
        }
        self.pi_num += &post.gamma.row(0);
        self.a_den += &post.gamma.slice(s![..len - 1, ..]).sum_axis(Axis(0));
        self.b_den += &post.gamma.sum_axis(Axis(0));
        self.a_num += &post.xi.sum_axis(Axis(0));
        for t in 0..len {
            let mut column = self.b_num.column_mut(sequence[t]);
            column += &post.gamma.row(t);
        }
        self.log_likelihood += post.log_likelihood;
        self.nseqs += 1;
        Ok(())
    }

    pub fn merge(&mut self, other: &SufficientStatistics) -> Result<()> {
        if (other.nstates(), other.nobs()) != (self.nstates(), self.nobs()) {
            return Err(HmmError::InvalidModel(format!(
                "cannot merge statistics over {} states and {} symbols into ones over {} states and {} symbols",
                other.nstates(), other.nobs(), self.nstates(), self.nobs()
            )));
        }
        self.pi_num += &other.pi_num;
        self.a_num += &other.a_num;
        self.a_den += &other.a_den;
        self.b_num += &other.b_num;
        self.b_den += &other.b_den;
        self.log_likelihood += other.log_likelihood;
        self.nseqs += other.nseqs;
        Ok(())
    }

    /// Log-likelihood of the sequences under the model they were collected with.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn len(&self) -> usize {
        self.nseqs
    }

    pub fn is_empty(&self) -> bool {
        self.nseqs == 0
    }

    /// M-step: the model maximising the expected log-likelihood.
    ///
    /// A state without posterior mass keeps the rows it has in `hmm`.
    pub fn reestimate(&self, hmm: &HMM) -> Result<HMM> {
        if self.nseqs == 0 {
            return Err(HmmError::EmptyCorpus);
        }
        if (hmm.nstates(), hmm.nobs()) != (self.nstates(), self.nobs()) {
            return Err(HmmError::InvalidModel(format!(
                "statistics over {} states and {} symbols for a model with {} states and {} symbols",
                self.nstates(), self.nobs(), hmm.nstates(), hmm.nobs()
            )));
        }
        let mut a = hmm.a().clone();
        let mut b = hmm.b().clone();
        for state in 0..hmm.nstates() {
            if self.a_den[state] > 0.0 {
                let a_row = &self.a_num.row(state) / self.a_den[state];
                a.row_mut(state).assign(&a_row);
            } else {
                warn!(state, "no transition out of this state has posterior mass, keeping its row of A");
            }
            if self.b_den[state] > 0.0 {
                let b_row = &self.b_num.row(state) / self.b_den[state];
                b.row_mut(state).assign(&b_row);
            } else {
                warn!(state, "state has no posterior mass, keeping its row of B");
            }
        }
        let pi = &self.pi_num / self.nseqs as f64;
        HMM::new(a, b, pi)
    }
}

/// Whether training stops after an iteration improving the log-likelihood by
/// `improvement`, and if so whether it converged. A decrease beyond rounding
/// is a stop without convergence.
fn stopping_state(improvement: f64, options: &TrainingOptions) -> Option<bool> {
    if improvement < options.min_loglik_improvement {
        Some(improvement >= -MONOTONICITY_TOLERANCE)
    } else {
        None
    }
}

fn total_change(old: &HMM, new: &HMM) -> f64 {
    let delta_a: f64 = (new.a() - old.a()).mapv(f64::abs).sum();
    let delta_b: f64 = (new.b() - old.b()).mapv(f64::abs).sum();
    let delta_pi: f64 = (new.pi() - old.pi()).mapv(f64::abs).sum();
    delta_a + delta_b + delta_pi
}

/// Baum-Welch re-estimation of `hmm` on `corpus`.
///
/// Stops after `max_iterations` iterations or at the first one improving the
/// corpus log-likelihood by less than `min_loglik_improvement`.
pub fn train(corpus: &[Array1<usize>], hmm: &HMM, options: &TrainingOptions) -> Result<TrainingOutcome> {
    if corpus.is_empty() {
        return Err(HmmError::EmptyCorpus);
    }
    let mut model = hmm.clone();
    let mut stats = SufficientStatistics::collect(corpus, &model)?;
    let initial_log_likelihood = stats.log_likelihood();
    info!(sequences = corpus.len(), log_likelihood = initial_log_likelihood, "starting Baum-Welch");

    let mut loglik_history = Vec::with_capacity(options.max_iterations);
    let mut previous = initial_log_likelihood;
    let mut converged = false;
    for iter in 0..options.max_iterations {
        let start_it = Instant::now();
        let new_model = stats.reestimate(&model)?;
        let new_stats = SufficientStatistics::collect(corpus, &new_model)?;
        let log_likelihood = new_stats.log_likelihood();
        let improvement = log_likelihood - previous;

        if improvement < -MONOTONICITY_TOLERANCE {
            warn!(iteration = iter + 1, previous, log_likelihood, "corpus log-likelihood decreased");
        }
        debug!(iteration = iter + 1, changes = total_change(&model, &new_model), "parameters updated");
        info!(
            iteration = iter + 1,
            log_likelihood,
            improvement,
            elapsed_ms = start_it.elapsed().as_millis() as u64,
            "Baum-Welch iteration"
        );

        loglik_history.push(log_likelihood);
        model = new_model;
        stats = new_stats;
        previous = log_likelihood;
        if let Some(done) = stopping_state(improvement, options) {
            converged = done;
            if converged {
                info!(iterations = iter + 1, log_likelihood, "Baum-Welch converged");
            } else {
                warn!(iterations = iter + 1, log_likelihood, "Baum-Welch stopped on a decreasing log-likelihood");
            }
            break;
        }
    }

    Ok(TrainingOutcome { model, initial_log_likelihood, loglik_history, converged })
}

/// Replaces the emissions of `hmm` with the frequencies observed along the
/// Viterbi paths of the corpus, floored at `options.floor` and renormalised.
///
/// This is a heuristic starting point for `train`; A and pi are kept.
pub fn viterbi_warm_start(corpus: &[Array1<usize>], hmm: &HMM, options: &WarmStartOptions) -> Result<HMM> {
    if !(options.floor >= 0.0 && options.floor.is_finite()) {
        return Err(HmmError::InvalidModel(format!("invalid emission floor {}", options.floor)));
    }
    let decoder = Viterbi::new(hmm);
    let mut counts: Array2<f64> = Array2::zeros((hmm.nstates(), hmm.nobs()));
    for (index, sequence) in corpus.iter().enumerate() {
        let path = decoder.decode(sequence).map_err(|e| e.in_corpus(index))?;
        Zip::from(&path.states).and(sequence).for_each(|&state, &obs| {
            counts[[state, obs]] += 1.0;
        });
    }

    for (state, mut row) in counts.axis_iter_mut(Axis(0)).enumerate() {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        } else {
            debug!(state, "state never on a Viterbi path, keeping its emissions");
            row.assign(&hmm.b().row(state));
        }
        row.mapv_inplace(|p| p.max(options.floor));
        let s = row.sum();
        row /= s;
    }
    hmm.with_emissions(counts)
}
