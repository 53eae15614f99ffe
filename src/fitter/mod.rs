pub mod common;
pub mod fit_settings;
pub mod main_fitter;
pub mod minimizer;
pub mod models;
pub mod retry;

pub use main_fitter::{FitResult, Fitter};
pub use retry::{FitOutcome, FitQuality, RetryPolicy};
