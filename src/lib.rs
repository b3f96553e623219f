//! Discrete hidden Markov models.
//!
//! The three classical problems are covered: the likelihood of an
//! observation sequence (`likelihood`, `log_likelihood`), its most probable
//! state path (`decode`) and the estimation of the parameters from a corpus
//! of sequences (`train`, Baum-Welch). Forward and backward passes are
//! scaled and Viterbi runs in the log domain, so long sequences do not
//! underflow.
//!
//! ```
//! use discrete_hmm::{decode, likelihood, HMM};
//! use ndarray::array;
//!
//! let hmm = HMM::new(
//!     array![[0.7, 0.3], [0.4, 0.6]],
//!     array![[0.9, 0.1], [0.2, 0.8]],
//!     array![0.6, 0.4],
//! ).unwrap();
//! let sequence = array![0, 1, 0];
//! assert!((likelihood(&sequence, &hmm).unwrap() - 0.10893).abs() < 1e-12);
//! assert_eq!(decode(&sequence, &hmm).unwrap().states, array![0, 1, 0]);
//! ```

pub mod error;
pub mod hmm;
pub mod utils;

pub use error::{HmmError, Result};
pub use hmm::*;
