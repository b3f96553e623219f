pub mod model;
pub mod forward;
pub mod backward;
pub mod viterbi;
pub mod posterior;
pub mod baum_welch;
pub mod sampling;

pub use model::HMM;
pub use forward::{corpus_log_likelihood, forward, forward_unscaled, likelihood, log_likelihood, ForwardLattice};
pub use backward::{backward, backward_unscaled};
pub use viterbi::{decode, path_log_probability, path_probability, Path, Viterbi};
pub use posterior::{posteriors, Posteriors};
pub use baum_welch::{train, viterbi_warm_start, SufficientStatistics, TrainingOptions, TrainingOutcome, WarmStartOptions};
pub use sampling::simulate_corpus;
