pub mod histo1d;

pub use histo1d::histogram1d::{Histogram, HistogramBinning};
