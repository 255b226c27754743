//! ibisami-tx application.
//!
//! This module contains a top-level structure [`App`] that represents the
//! ibisami-tx command line application. The application runs the model
//! initialization on a channel impulse response, the same way a host simulator
//! would, and writes the results as JSON.

use crate::{
    args::Args,
    equalize::{self, ImpulseMatrix},
    model::{Session, TxModel},
    tx::ExampleTx,
    wave::{ideal_impulse, Wave},
};
use ami_json::{AmiParams, InitOutput, TxTaps};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::path::PathBuf;

/// ibisami-tx application.
#[derive(Debug, Clone)]
pub struct App {
    params_in: String,
    channel_response: Vec<f64>,
    sample_interval: f64,
    bit_time: f64,
    output: Option<PathBuf>,
}

impl App {
    /// Creates a new application.
    ///
    /// This loads the channel impulse response and the AMI parameters given
    /// in the arguments.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub fn new(args: &Args) -> Result<App> {
        let params_in = match &args.params_json {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let params: AmiParams = serde_json::from_str(&json)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                if let Some(name) = params.unquotable_param() {
                    anyhow::bail!("string value of parameter {name} contains a '\"'");
                }
                params.to_string()
            }
            None => args.params.clone(),
        };
        let channel_response = match &args.impulse {
            Some(path) => Wave::load(path)?.resample(args.sample_interval)?,
            None => ideal_impulse(args.row_size),
        };
        tracing::info!(
            %params_in,
            rows = channel_response.len(),
            "loaded channel impulse response"
        );
        Ok(App {
            params_in,
            channel_response,
            sample_interval: args.sample_interval,
            bit_time: args.bit_time,
            output: args.output.clone(),
        })
    }

    /// Runs the model initialization and returns its output.
    ///
    /// Besides the equalized impulse response, the output contains the step
    /// and pulse responses derived from it, and the step response obtained by
    /// filtering the channel step response in time-domain mode.
    pub fn init_output(&self) -> Result<InitOutput> {
        let mut equalized = self.channel_response.clone();
        let rows = equalized.len();
        let mut matrix = ImpulseMatrix::new(&mut equalized, rows, 0)?;
        let mut session = Session::new(ExampleTx);
        session.init(
            &mut matrix,
            self.sample_interval,
            self.bit_time,
            &self.params_in,
        )?;
        let (Some(settings), Some(samples_per_bit), Some(kernel), Some(warnings)) = (
            session.settings(),
            session.samples_per_bit(),
            session.kernel(),
            session.warnings(),
        ) else {
            anyhow::bail!("session not initialized after a successful initialization");
        };
        let step_response = equalize::step_response(&equalized);
        let pulse_response = equalize::pulse_response(&step_response, samples_per_bit);
        let kernel = kernel.to_vec();
        let warnings = warnings.to_vec();
        let taps = TxTaps {
            tx_tap_units: settings.units(),
            codes: settings.codes().to_vec(),
            weights: settings.weights().to_vec(),
            samples_per_bit,
        };
        let mut getwave_step_response = equalize::step_response(&self.channel_response);
        session.get_wave(&mut getwave_step_response)?;
        Ok(InitOutput {
            model: session.model().name().to_string(),
            version: format!(
                "{} ({})",
                env!("CARGO_PKG_VERSION"),
                git_version::git_version!(fallback = "unknown")
            ),
            datetime: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            sample_interval: self.sample_interval,
            bit_time: self.bit_time,
            params_in: self.params_in.clone(),
            params_out: session.params_out().to_string(),
            message: session.message().to_string(),
            warnings,
            taps,
            kernel,
            channel_response: self.channel_response.clone(),
            equalized_response: equalized,
            step_response,
            pulse_response,
            getwave_step_response,
        })
    }

    /// Runs the application.
    ///
    /// The output is written to the output file, or to stdout if there is no
    /// output file.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub fn run(self) -> Result<()> {
        let output = self.init_output()?;
        for warning in &output.warnings {
            tracing::warn!("{warning}");
        }
        let json = serde_json::to_string_pretty(&output)?;
        match &self.output {
            Some(path) => std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
