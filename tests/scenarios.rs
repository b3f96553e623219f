use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use discrete_hmm::{
    backward, corpus_log_likelihood, decode, forward, forward_unscaled, likelihood, path_log_probability, train,
    viterbi_warm_start, TrainingOptions, WarmStartOptions, HMM,
};

fn textbook() -> HMM {
    HMM::new(
        array![[0.7, 0.3], [0.4, 0.6]],
        array![[0.9, 0.1], [0.2, 0.8]],
        array![0.6, 0.4],
    ).unwrap()
}

fn assert_stochastic(hmm: &HMM) {
    for row in hmm.a().axis_iter(Axis(0)).chain(hmm.b().axis_iter(Axis(0))) {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        assert!(row.iter().all(|&p| p >= 0.0));
    }
    assert_abs_diff_eq!(hmm.pi().sum(), 1.0, epsilon = 1e-9);
}

fn varied_corpus(hmm: &HMM, count: usize, rng: &mut StdRng) -> Vec<Array1<usize>> {
    (0..count)
        .map(|_| {
            let len = rng.gen_range(5..=10);
            hmm.simulate(len, rng).unwrap().1
        })
        .collect()
}

#[test]
fn textbook_forward_pass() {
    let hmm = textbook();
    let sequence = array![0, 1, 0];
    let alpha = forward_unscaled(&sequence, &hmm).unwrap();
    assert_abs_diff_eq!(alpha[[0, 0]], 0.54, epsilon = 1e-12);
    assert_abs_diff_eq!(alpha[[0, 1]], 0.08, epsilon = 1e-12);

    // alpha[1] = [0.1 * (0.54 * 0.7 + 0.08 * 0.4), 0.8 * (0.54 * 0.3 + 0.08 * 0.6)]
    // alpha[2] = [0.9 * (0.041 * 0.7 + 0.168 * 0.4), 0.2 * (0.041 * 0.3 + 0.168 * 0.6)]
    let reference = 0.9 * (0.041 * 0.7 + 0.168 * 0.4) + 0.2 * (0.041 * 0.3 + 0.168 * 0.6);
    assert_abs_diff_eq!(likelihood(&sequence, &hmm).unwrap(), reference, epsilon = 1e-12);
    assert_abs_diff_eq!(alpha.row(2).sum(), reference, epsilon = 1e-12);
}

#[test]
fn forward_backward_consistency() {
    let mut rng = StdRng::seed_from_u64(21);
    let hmm = HMM::random(3, 5, &mut rng).unwrap();
    let (_, sequence) = hmm.simulate(1000, &mut rng).unwrap();
    let lattice = forward(&sequence, &hmm).unwrap();
    let beta = backward(&sequence, &hmm).unwrap();
    for t in 0..sequence.len() {
        let product = (&lattice.alpha().row(t) * &beta.row(t)).sum();
        assert_abs_diff_eq!(product, 1.0, epsilon = 1e-9);
    }
    assert!(lattice.log_likelihood().is_finite());
}

#[test]
fn viterbi_beats_the_simulated_path() {
    let mut rng = StdRng::seed_from_u64(5);
    let hmm = HMM::random(3, 3, &mut rng).unwrap();
    for _ in 0..25 {
        let (states, sequence) = hmm.simulate(60, &mut rng).unwrap();
        let path = decode(&sequence, &hmm).unwrap();
        let truth = path_log_probability(&states, &sequence, &hmm).unwrap();
        assert!(path.log_probability >= truth - 1e-12);
    }
}

#[test]
fn deterministic_model_decodes_to_a_constant_path() {
    let hmm = HMM::new(
        array![[0.2, 0.3, 0.5], [0.3, 0.3, 0.4], [0.0, 0.0, 1.0]],
        array![[0.5, 0.5], [0.5, 0.5], [0.0, 1.0]],
        array![0.3, 0.3, 0.4],
    ).unwrap();
    let path = decode(&Array1::from_elem(12, 1), &hmm).unwrap();
    assert_eq!(path.states, Array1::from_elem(12, 2));
}

#[test]
fn baum_welch_on_a_simulated_corpus() {
    let mut rng = StdRng::seed_from_u64(2024);
    let truth = HMM::random(2, 4, &mut rng).unwrap();
    let corpus = varied_corpus(&truth, 50, &mut rng);
    let start = HMM::random(2, 4, &mut StdRng::seed_from_u64(99)).unwrap();

    let options = TrainingOptions { max_iterations: 20, min_loglik_improvement: f64::NEG_INFINITY };
    let outcome = train(&corpus, &start, &options).unwrap();
    assert_eq!(outcome.loglik_history.len(), 20);
    assert_stochastic(&outcome.model);

    let mut previous = outcome.initial_log_likelihood;
    for &ll in &outcome.loglik_history {
        assert!(ll >= previous - 1e-6, "log-likelihood went from {} to {}", previous, ll);
        previous = ll;
    }

    let initial = outcome.initial_log_likelihood;
    let truth_ll = corpus_log_likelihood(&corpus, &truth).unwrap();
    assert!(previous > initial);
    if initial < truth_ll {
        assert!(previous > truth_ll - 0.5 * (truth_ll - initial));
    }
}

#[test]
fn warm_start_then_train() {
    let mut rng = StdRng::seed_from_u64(77);
    let truth = HMM::random(3, 4, &mut rng).unwrap();
    let corpus = varied_corpus(&truth, 40, &mut rng);
    let start = HMM::random(3, 4, &mut rng).unwrap();
    let warm = viterbi_warm_start(&corpus, &start, &WarmStartOptions::default()).unwrap();
    assert_stochastic(&warm);

    let outcome = train(&corpus, &warm, &TrainingOptions::default()).unwrap();
    assert_stochastic(&outcome.model);
    assert!(outcome.loglik_history.len() <= TrainingOptions::default().max_iterations);
    let last = *outcome.loglik_history.last().unwrap();
    assert!(last >= outcome.initial_log_likelihood - 1e-6);
}
