//! ami-json contains the JSON schemas used by ibisami-tx and its tooling.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AMI parameters JSON schema.
///
/// This JSON schema describes the set of AMI parameters handed to a model at
/// initialization. It is the JSON counterpart of the parameter string that the
/// host simulator passes to `AMI_Init()`. Its [`Display`](std::fmt::Display)
/// implementation renders that parameter string.
///
/// Floating point values are always rendered with a decimal point or an
/// exponent, so they are never read back as integers. AMI strings have no
/// escape sequences, so a string value containing `"` cannot be rendered. Use
/// [`AmiParams::unquotable_param`] to check for those before rendering.
///
/// # Examples
/// ```
/// use ami_json::{AmiParams, ParamValue};
/// let mut params = AmiParams::new("example_tx");
/// params.params.insert("tx_tap_np1".to_string(), ParamValue::Int(2));
/// assert_eq!(params.to_string(), "(example_tx (tx_tap_np1 2))");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AmiParams {
    /// Name of the root node.
    ///
    /// This is usually the model name. It is not part of the path used to look
    /// up parameters.
    #[serde(default)]
    pub root_name: String,
    /// Parameter values, keyed by parameter name.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl AmiParams {
    /// Creates an empty parameter set with the given root name.
    pub fn new(root_name: &str) -> AmiParams {
        AmiParams {
            root_name: root_name.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Returns the name of the first parameter holding a string value that
    /// contains a `"`, if any.
    pub fn unquotable_param(&self) -> Option<&str> {
        fn find(params: &BTreeMap<String, ParamValue>) -> Option<&str> {
            params.iter().find_map(|(name, value)| match value {
                ParamValue::Str(s) if s.contains('"') => Some(name.as_str()),
                ParamValue::Branch(branch) => find(branch),
                _ => None,
            })
        }
        find(&self.params)
    }
}

/// AMI parameter value.
///
/// A value is either a scalar or a branch containing sub-parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Branch of sub-parameters.
    Branch(BTreeMap<String, ParamValue>),
}

fn write_node(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    value: &ParamValue,
) -> Result<(), std::fmt::Error> {
    write!(f, "({name} ")?;
    match value {
        ParamValue::Bool(true) => write!(f, "True")?,
        ParamValue::Bool(false) => write!(f, "False")?,
        ParamValue::Int(x) => write!(f, "{x}")?,
        ParamValue::Float(x) => write!(f, "{x:?}")?,
        ParamValue::Str(s) => write!(f, "\"{s}\"")?,
        ParamValue::Branch(branch) => {
            for (n, (sub_name, sub_value)) in branch.iter().enumerate() {
                if n != 0 {
                    write!(f, " ")?;
                }
                write_node(f, sub_name, sub_value)?;
            }
        }
    }
    write!(f, ")")
}

impl std::fmt::Display for AmiParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "({}", self.root_name)?;
        for (name, value) in &self.params {
            write!(f, " ")?;
            write_node(f, name, value)?;
        }
        write!(f, ")")
    }
}

/// Tx taps JSON schema.
///
/// This contains the FIR tap settings derived by the model during
/// initialization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TxTaps {
    /// Total number of tap units available to the FIR filter.
    pub tx_tap_units: i64,
    /// Integer tap codes, in kernel order.
    pub codes: Vec<i64>,
    /// Tap weights in volts, in kernel order.
    pub weights: Vec<f64>,
    /// Number of impulse response samples per unit interval.
    pub samples_per_bit: usize,
}

/// Initialization output JSON schema.
///
/// This is the document written by the `ibisami-tx` command line tool after
/// running the model initialization on a channel impulse response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InitOutput {
    /// Model name.
    pub model: String,
    /// Model version.
    pub version: String,
    /// Time at which the output was generated, in RFC 3339 format.
    pub datetime: String,
    /// Sample interval of the impulse responses in seconds.
    pub sample_interval: f64,
    /// Unit interval in seconds.
    pub bit_time: f64,
    /// AMI parameter string given to the model.
    pub params_in: String,
    /// Derived parameter report returned by the model.
    pub params_out: String,
    /// Diagnostic message returned by the model.
    pub message: String,
    /// Warnings raised while validating the tap configuration.
    pub warnings: Vec<String>,
    /// Derived tap settings.
    pub taps: TxTaps,
    /// FIR kernel at the channel sample rate.
    pub kernel: Vec<f64>,
    /// Channel impulse response given to the model.
    pub channel_response: Vec<f64>,
    /// Channel impulse response after Tx equalization.
    pub equalized_response: Vec<f64>,
    /// Step response of the channel after Tx equalization.
    pub step_response: Vec<f64>,
    /// Pulse response of the channel after Tx equalization, for a pulse one
    /// unit interval long.
    pub pulse_response: Vec<f64>,
    /// Step response of the channel filtered by the model in time-domain
    /// (`AMI_GetWave()`) mode. It matches `step_response` when both modes of
    /// the model agree.
    pub getwave_step_response: Vec<f64>,
}
