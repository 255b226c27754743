//! ibisami-tx CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the ibisami-tx
//! application.

use clap::Parser;
use std::path::PathBuf;

/// ibisami-tx CLI arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Channel impulse response file (time and voltage per line, one header
    /// line). An ideal impulse is used if not given
    #[clap(long)]
    pub impulse: Option<PathBuf>,
    /// Number of samples of the ideal impulse response
    #[clap(long, default_value_t = 128)]
    pub row_size: usize,
    /// Sample interval in seconds
    #[clap(long, default_value_t = 25e-12)]
    pub sample_interval: f64,
    /// Unit interval in seconds
    #[clap(long, default_value_t = 100e-12)]
    pub bit_time: f64,
    /// AMI parameter string
    #[clap(long, default_value = "(example_tx)", conflicts_with = "params_json")]
    pub params: String,
    /// JSON file with the AMI parameters
    #[clap(long)]
    pub params_json: Option<PathBuf>,
    /// Output JSON file. The output is written to stdout if not given
    #[clap(long)]
    pub output: Option<PathBuf>,
}
