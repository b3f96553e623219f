use thiserror::Error;

#[derive(Error, Debug)]
pub enum HmmError {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("observation {symbol} at t={t} is outside the alphabet [0, {nobs})")]
    InvalidObservation { t: usize, symbol: usize, nobs: usize },

    #[error("state {state} at t={t} is outside [0, {nstates})")]
    InvalidState { t: usize, state: usize, nstates: usize },

    #[error("observation sequence is empty")]
    EmptySequence,

    #[error("the training corpus is empty")]
    EmptyCorpus,

    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("every state path has zero probability at t={t}")]
    DegenerateSequence { t: usize },

    #[error("unscaled probabilities underflowed to zero at t={t}")]
    NumericUnderflow { t: usize },

    #[error("sequence {index} of the corpus: {source}")]
    Corpus {
        index: usize,
        #[source]
        source: Box<HmmError>,
    },
}

impl HmmError {
    pub fn in_corpus(self, index: usize) -> Self {
        HmmError::Corpus { index, source: Box::new(self) }
    }
}

pub type Result<T> = std::result::Result<T, HmmError>;
