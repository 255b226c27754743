//! Tx model sessions.
//!
//! A [`Session`] is the model instance owned by one host session. It runs the
//! initialization sequence (resolve parameters, validate them, build the FIR
//! kernel, equalize the channel impulse response) and keeps the resulting
//! kernel for time-domain processing.

use crate::{
    equalize::{self, ImpulseMatrix, StreamingFir},
    params::{ParamTree, ParameterSource},
    tx,
};
use anyhow::Result;

/// Tx equalizer model.
///
/// This trait gathers the capabilities that a concrete Tx model provides to a
/// [`Session`].
pub trait TxModel {
    /// Settings derived from the AMI parameters.
    type Settings: std::fmt::Debug + Clone;

    /// Returns the model name.
    fn name(&self) -> &str;

    /// Resolves the model settings from the AMI parameters.
    ///
    /// Missing parameters take their defaults. An error means that the
    /// parameter values cannot be turned into settings at all.
    fn resolve(&self, params: &dyn ParameterSource) -> Result<Self::Settings>;

    /// Checks the settings and returns a list of non-fatal warnings.
    fn validate(&self, settings: &Self::Settings) -> Vec<String>;

    /// Builds the FIR kernel at the channel sample rate.
    ///
    /// The kernel must not be empty if `samples_per_bit` is at least one.
    fn build_kernel(&self, settings: &Self::Settings, samples_per_bit: usize) -> Vec<f64>;

    /// Formats the derived parameter report.
    fn report(&self, settings: &Self::Settings, samples_per_bit: usize) -> String;
}

#[derive(Debug, Clone)]
enum State<S> {
    Uninitialized,
    Initialized(Initialized<S>),
}

#[derive(Debug, Clone)]
struct Initialized<S> {
    settings: S,
    samples_per_bit: usize,
    kernel: Vec<f64>,
    warnings: Vec<String>,
    fir: StreamingFir,
}

/// Tx model session.
///
/// # Examples
/// ```
/// use ibisami_tx::{equalize::ImpulseMatrix, model::Session, tx::ExampleTx};
/// let mut response = vec![0.0; 32];
/// response[0] = 1.0;
/// let mut matrix = ImpulseMatrix::new(&mut response, 32, 0)?;
/// let mut session = Session::new(ExampleTx);
/// session.init(&mut matrix, 1.0, 8.0, "(example_tx (tx_tap_nm1 2))")?;
/// assert_eq!(session.kernel().unwrap().len(), 32);
/// assert!(session.warnings().unwrap().is_empty());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Session<M: TxModel> {
    model: M,
    state: State<M::Settings>,
    params_out: String,
    message: String,
}

impl<M: TxModel> Session<M> {
    /// Creates a new uninitialized session for a model.
    pub fn new(model: M) -> Session<M> {
        Session {
            model,
            state: State::Uninitialized,
            params_out: String::new(),
            message: String::new(),
        }
    }

    /// Returns the model of the session.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Initializes the session and equalizes an impulse response matrix.
    ///
    /// The AMI parameter string is parsed, the model settings are resolved and
    /// validated, and the FIR kernel is built. The kernel replaces that of any
    /// previous initialization and is then applied to every column of
    /// `matrix`.
    ///
    /// Validation warnings do not make the initialization fail; they are
    /// appended to the [message](Session::message). The function fails if the
    /// parameter string cannot be parsed, if the tap codes overflow, or if the
    /// bit time is shorter than the sample interval. In that case the session
    /// and `matrix` are left unchanged, except for the message.
    #[tracing::instrument(name = "Session::init", level = "debug", skip(self, matrix))]
    pub fn init(
        &mut self,
        matrix: &mut ImpulseMatrix<'_>,
        sample_interval: f64,
        bit_time: f64,
        params_in: &str,
    ) -> Result<()> {
        self.message = String::from("Initializing Tx...\n");
        let params = ParamTree::parse(params_in)?;
        let samples_per_bit = tx::samples_per_bit(bit_time, sample_interval)?;
        tracing::debug!(
            samples_per_bit,
            rows = matrix.rows(),
            columns = matrix.columns(),
            "derived samples per bit"
        );

        let settings = self.model.resolve(&params)?;
        let warnings = self.model.validate(&settings);
        for warning in &warnings {
            self.message.push_str(&format!("WARNING: {warning}\n"));
        }
        let kernel = self.model.build_kernel(&settings, samples_per_bit);
        if kernel.is_empty() {
            anyhow::bail!("model {} built an empty FIR kernel", self.model.name());
        }
        self.params_out = self.model.report(&settings, samples_per_bit);
        self.message.push('\n');

        self.state = State::Initialized(Initialized {
            fir: StreamingFir::new(&kernel),
            settings,
            samples_per_bit,
            kernel,
            warnings,
        });
        if let State::Initialized(init) = &self.state {
            equalize::apply_kernel(matrix, &init.kernel);
        }
        Ok(())
    }

    /// Filters a waveform block in place with the session kernel.
    ///
    /// Consecutive calls continue the same filtering, so a waveform split in
    /// several blocks gives the same result as the whole waveform at once. The
    /// function fails if the session has not been initialized.
    pub fn get_wave(&mut self, wave: &mut [f64]) -> Result<()> {
        let State::Initialized(init) = &mut self.state else {
            anyhow::bail!("GetWave called before a successful initialization");
        };
        init.fir.process(wave);
        Ok(())
    }

    /// Appends a line to the diagnostic message.
    pub fn append_message(&mut self, line: &str) {
        self.message.push_str(line);
        self.message.push('\n');
    }

    /// Returns the derived parameter report of the last initialization.
    pub fn params_out(&self) -> &str {
        &self.params_out
    }

    /// Returns the diagnostic message of the last initialization.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the model settings, if the session is initialized.
    pub fn settings(&self) -> Option<&M::Settings> {
        self.initialized().map(|init| &init.settings)
    }

    /// Returns the number of samples per unit interval, if the session is
    /// initialized.
    pub fn samples_per_bit(&self) -> Option<usize> {
        self.initialized().map(|init| init.samples_per_bit)
    }

    /// Returns the FIR kernel, if the session is initialized.
    pub fn kernel(&self) -> Option<&[f64]> {
        self.initialized().map(|init| init.kernel.as_slice())
    }

    /// Returns the validation warnings, if the session is initialized.
    pub fn warnings(&self) -> Option<&[String]> {
        self.initialized().map(|init| init.warnings.as_slice())
    }

    fn initialized(&self) -> Option<&Initialized<M::Settings>> {
        match &self.state {
            State::Uninitialized => None,
            State::Initialized(init) => Some(init),
        }
    }
}
