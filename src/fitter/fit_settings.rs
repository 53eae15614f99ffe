use super::minimizer::MinimizerConfig;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct FitSettings {
    pub numerator_range: (f64, f64),
    pub denominator_range: (f64, f64),
    /// Compare each bin with the model averaged over the bin instead of the
    /// model at the bin centre.
    pub bin_integral: bool,
    pub minimizer: MinimizerConfig,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            numerator_range: (1.8, 2.02),
            denominator_range: (1.8, 2.10),
            bin_integral: true,
            minimizer: MinimizerConfig::default(),
        }
    }
}
