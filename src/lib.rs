//! ibisami-tx is an IBIS-AMI transmitter model with FIR pre-emphasis. It
//! derives the tap weights of the pre-emphasis filter from integer tap codes
//! given as AMI parameters, and equalizes the channel impulse responses handed
//! over by the host simulator. The model is exported through the IBIS-AMI C ABI
//! and can also be run from the command line.

#![warn(missing_docs)]

pub mod ami;
pub mod app;
pub mod args;
pub mod equalize;
pub mod model;
pub mod params;
pub mod tx;
pub mod wave;
