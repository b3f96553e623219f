use anyhow::{anyhow, ensure, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::{Array1, Array2};
use ndarray_csv::{Array2Reader, Array2Writer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::hmm::{TrainingOptions, WarmStartOptions, HMM};

pub fn read_matrix(path: &Path, nrows: usize, ncols: usize) -> Result<Array2<f64>> {
    let file = File::open(path).with_context(|| format!("cannot open matrix file {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(false).from_reader(file);
    reader.deserialize_array2((nrows, ncols))
        .with_context(|| format!("cannot read a {}x{} matrix from {}", nrows, ncols, path.display()))
}

pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)
        .with_context(|| format!("cannot create matrix file {}", path.display()))?;
    writer.serialize_array2(matrix)?;
    writer.flush()?;
    Ok(())
}

/// Reads one whitespace separated sequence per line; blank lines are skipped.
pub fn load_sequences(path: &Path) -> Result<Vec<Array1<usize>>> {
    let file = File::open(path).with_context(|| format!("cannot open sequences file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut ret: Vec<Array1<usize>> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sequence = line.split_whitespace()
            .map(|x| x.parse::<usize>())
            .collect::<std::result::Result<Vec<usize>, _>>()
            .with_context(|| format!("{}:{}: not a sequence of integers", path.display(), lineno + 1))?;
        ret.push(Array1::from_vec(sequence));
    }
    Ok(ret)
}

fn array_to_str(a: &Array1<usize>) -> String {
    a.iter().map(|x| x.to_string()).collect::<Vec<String>>().join(" ")
}

pub fn write_sequences(path: &Path, outputs: &[Array1<usize>]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut file = BufWriter::new(file);
    for output in outputs {
        writeln!(file, "{}", array_to_str(output))?;
    }
    file.flush()?;
    Ok(())
}

pub fn write_values(path: &Path, values: &[f64]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut file = BufWriter::new(file);
    for v in values {
        writeln!(file, "{}", v)?;
    }
    file.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut file = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    Ok(())
}

/// Fraction of positions where the predicted state differs from the truth.
pub fn error_rate(predictions: &[Array1<usize>], truth: &[Array1<usize>]) -> Result<f64> {
    ensure!(predictions.len() == truth.len(), "{} predicted sequences for {} tagged ones", predictions.len(), truth.len());
    let mut errors = 0.0;
    let mut total = 0.0;
    for (i, (prediction, tags)) in predictions.iter().zip(truth.iter()).enumerate() {
        ensure!(prediction.len() == tags.len(), "sequence {} has {} predictions for {} tags", i, prediction.len(), tags.len());
        for (p, t) in prediction.iter().zip(tags.iter()) {
            if p != t {
                errors += 1.0;
            }
            total += 1.0;
        }
    }
    if total == 0.0 {
        return Ok(0.0);
    }
    Ok(errors / total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Likelihood,
    Decode,
    Train,
    Simulate,
}

fn default_simulate_count() -> usize { 50 }

fn default_simulate_length() -> usize { 10 }

/// JSON configuration of a run of the command line tool.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub method: Method,
    /// Directory holding the headerless CSV files `A`, `B` and `pi`.
    #[serde(default)]
    pub hmm_path: Option<PathBuf>,
    #[serde(default)]
    pub input_path: Option<PathBuf>,
    #[serde(default)]
    pub tags_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub nstates: usize,
    pub nobs: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Start training from a random model instead of `hmm_path`.
    #[serde(default)]
    pub random_init: bool,
    #[serde(default)]
    pub training: TrainingOptions,
    #[serde(default)]
    pub warm_start: Option<WarmStartOptions>,
    #[serde(default = "default_simulate_count")]
    pub simulate_count: usize,
    #[serde(default = "default_simulate_length")]
    pub simulate_length: usize,
}

fn required<'a>(path: &'a Option<PathBuf>, name: &str, method: Method) -> Result<&'a Path> {
    path.as_deref().ok_or_else(|| anyhow!("{} is required by the {:?} method", name, method))
}

impl Config {

    pub fn from_config_file(filename: &Path) -> Result<Self> {
        let file = File::open(filename).with_context(|| format!("cannot open config file {}", filename.display()))?;
        let config = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed config file {}", filename.display()))?;
        Ok(config)
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn load_model(&self) -> Result<HMM> {
        let dir = required(&self.hmm_path, "hmm_path", self.method)?;
        let a = read_matrix(&dir.join("A"), self.nstates, self.nstates)?;
        let b = read_matrix(&dir.join("B"), self.nstates, self.nobs)?;
        let pi = read_matrix(&dir.join("pi"), 1, self.nstates)?.row(0).to_owned();
        HMM::new(a, b, pi).with_context(|| format!("invalid model in {}", dir.display()))
    }

    /// The model to start from: random when `random_init` is set, loaded otherwise.
    pub fn initial_model(&self, rng: &mut StdRng) -> Result<HMM> {
        if self.random_init {
            Ok(HMM::random(self.nstates, self.nobs, rng)?)
        } else {
            self.load_model()
        }
    }

    pub fn get_sequences(&self) -> Result<Vec<Array1<usize>>> {
        load_sequences(required(&self.input_path, "input_path", self.method)?)
    }

    pub fn get_tags(&self) -> Result<Option<Vec<Array1<usize>>>> {
        self.tags_path.as_deref().map(load_sequences).transpose()
    }
}
