#![warn(clippy::all, rust_2018_idioms)]

//! Signal efficiency in kinematic bins from fits to invariant mass spectra.

pub mod archive;
pub mod binning;
pub mod config;
pub mod cutter;
pub mod dataset;
pub mod efficiency;
pub mod error;
pub mod fit_log;
pub mod fitter;
pub mod histoer;
pub mod results;
pub mod runner;

pub use config::Config;
pub use error::{EffError, Result};
pub use runner::{RunReport, run, run_with_dataset};
