use anyhow::{anyhow, Context, Result};
use clap::{Arg, Command};
use ndarray::Array1;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use std::path::{Path, PathBuf};
use std::time::Instant;

use discrete_hmm::utils::{self, Config, Method};
use discrete_hmm::{train, viterbi_warm_start, Viterbi, HMM};

fn likelihood(config: &Config) -> Result<()> {
    let hmm = config.load_model()?;
    let sequences = config.get_sequences()?;
    let start = Instant::now();
    let mut values = Vec::with_capacity(sequences.len());
    for (i, sequence) in sequences.iter().enumerate() {
        let ll = discrete_hmm::log_likelihood(sequence, &hmm).with_context(|| format!("sequence {}", i))?;
        values.push(ll);
    }
    let total: f64 = values.iter().sum();
    info!(sequences = values.len(), log_likelihood = total, elapsed_ms = start.elapsed().as_millis() as u64, "likelihood computed");
    utils::write_values(&config.output_path, &values)
}

fn decode(config: &Config) -> Result<()> {
    let hmm = config.load_model()?;
    let sequences = config.get_sequences()?;
    let decoder = Viterbi::new(&hmm);

    let start = Instant::now();
    let mut predictions: Vec<Array1<usize>> = Vec::with_capacity(sequences.len());
    for (i, sequence) in sequences.iter().enumerate() {
        let path = decoder.decode(sequence).with_context(|| format!("sequence {}", i))?;
        predictions.push(path.states);
    }
    let elapsed = start.elapsed().as_millis() as u64;
    if let Some(tags) = config.get_tags()? {
        let error_rate = utils::error_rate(&predictions, &tags)?;
        info!(error_rate, elapsed_ms = elapsed, "decoded");
    } else {
        info!(sequences = predictions.len(), elapsed_ms = elapsed, "decoded");
    }
    utils::write_sequences(&config.output_path, &predictions)
}

fn training(config: &Config) -> Result<()> {
    let mut rng = config.rng();
    let sequences = config.get_sequences()?;
    let mut hmm = config.initial_model(&mut rng)?;
    if let Some(options) = &config.warm_start {
        hmm = viterbi_warm_start(&sequences, &hmm, options)?;
        info!(floor = options.floor, "emissions initialised from Viterbi paths");
    }
    let outcome = train(&sequences, &hmm, &config.training)?;
    info!(
        iterations = outcome.loglik_history.len(),
        converged = outcome.converged,
        log_likelihood = outcome.loglik_history.last().copied().unwrap_or(outcome.initial_log_likelihood),
        "training done"
    );
    utils::write_json(&config.output_path, &outcome)
}

fn simulate(config: &Config) -> Result<()> {
    let mut rng = config.rng();
    let hmm = config.initial_model(&mut rng)?;
    let mut observations = Vec::with_capacity(config.simulate_count);
    let mut states = Vec::with_capacity(config.simulate_count);
    for _ in 0..config.simulate_count {
        let (q, o) = hmm.simulate(config.simulate_length, &mut rng)?;
        states.push(q);
        observations.push(o);
    }
    info!(sequences = observations.len(), length = config.simulate_length, "sequences sampled");
    if let Some(tags_path) = &config.tags_path {
        utils::write_sequences(tags_path, &states)?;
    }
    if config.random_init {
        if let Some(dir) = &config.hmm_path {
            write_model(dir, &hmm)?;
        }
    }
    utils::write_sequences(&config.output_path, &observations)
}

fn write_model(dir: &Path, hmm: &HMM) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    utils::write_matrix(&dir.join("A"), hmm.a())?;
    utils::write_matrix(&dir.join("B"), hmm.b())?;
    let pi = hmm.pi().clone().insert_axis(ndarray::Axis(0));
    utils::write_matrix(&dir.join("pi"), &pi)
}

fn main() -> Result<()> {
    let matches = Command::new("discrete-hmm")
        .version("0.1")
        .about("Likelihood, decoding and Baum-Welch training of discrete hidden Markov models")
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("configuration file")
            .takes_value(true)
            .required(true))
        .arg(Arg::new("log-level")
            .short('l')
            .long("log-level")
            .value_name("LEVEL")
            .help("trace, debug, info, warn or error")
            .takes_value(true)
            .default_value("info"))
        .get_matches();

    let level = match matches.value_of("log-level").unwrap_or("info") {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(anyhow!("unknown log level {}", other)),
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = matches.value_of("config").map(PathBuf::from).ok_or_else(|| anyhow!("no config file provided"))?;
    let config = Config::from_config_file(&config_path)?;

    match config.method {
        Method::Likelihood => likelihood(&config),
        Method::Decode => decode(&config),
        Method::Train => training(&config),
        Method::Simulate => simulate(&config),
    }
}
