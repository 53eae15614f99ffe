/// Fixed-width binning shared by every mass histogram of a run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HistogramBinning {
    pub bins: usize,
    pub range: (f64, f64),
}

impl Default for HistogramBinning {
    fn default() -> Self {
        Self {
            bins: 40,
            range: (1.8, 2.1),
        }
    }
}

impl HistogramBinning {
    pub fn bin_width(&self) -> f64 {
        (self.range.1 - self.range.0) / self.bins as f64
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Histogram {
    pub name: String,
    pub bins: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    pub range: (f64, f64),
    pub overflow: u64,
    pub underflow: u64,
    pub bin_width: f64,
}

impl Histogram {
    // Create a new Histogram with specified min, max, and number of bins
    pub fn new(name: &str, number_of_bins: usize, range: (f64, f64)) -> Self {
        Histogram {
            name: name.to_owned(),
            bins: vec![0.0; number_of_bins],
            sumw2: vec![0.0; number_of_bins],
            range,
            overflow: 0,
            underflow: 0,
            bin_width: (range.1 - range.0) / number_of_bins as f64,
        }
    }

    pub fn with_binning(name: &str, binning: &HistogramBinning) -> Self {
        Self::new(name, binning.bins, binning.range)
    }

    pub fn binning(&self) -> HistogramBinning {
        HistogramBinning {
            bins: self.bins.len(),
            range: self.range,
        }
    }
}
