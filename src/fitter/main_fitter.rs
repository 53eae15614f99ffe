use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::common::Parameter;
use super::fit_settings::FitSettings;
use super::minimizer::{self, MinimizerConfig};
use super::models::mass::{MassModel, SignalYield};
use crate::error::{EffError, Result};
use crate::histoer::Histogram;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitResult {
    pub parameters: Vec<Parameter>,
    pub range: (f64, f64),
    pub chi2: f64,
    pub ndf: usize,
    /// Chi2 p-value. Zero when the minimiser did not converge or a parameter
    /// ended up outside its limits.
    pub probability: f64,
    pub converged: bool,
    pub iterations: u64,
}

impl FitResult {
    pub fn signal_yield(&self, bin_width: f64) -> SignalYield {
        MassModel::signal_yield(&self.parameters, bin_width)
    }

    pub fn within_bounds(&self) -> bool {
        self.parameters.iter().all(|p| {
            let value = p.fitted();
            value.is_finite() && p.is_within_bounds(value)
        })
    }
}

pub fn chi2_probability(chi2: f64, ndf: usize) -> Result<f64> {
    let dist = ChiSquared::new(ndf as f64).map_err(|e| EffError::Fit(e.to_string()))?;
    Ok((1.0 - dist.cdf(chi2)).clamp(0.0, 1.0))
}

/// Fits the mass model to one histogram. Every call starts from the model's
/// own parameters, so a `Fitter` can be shared between bins and threads.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Fitter {
    pub model: MassModel,
    pub bin_integral: bool,
    pub minimizer: MinimizerConfig,
}

impl Fitter {
    pub fn new(settings: &FitSettings) -> Self {
        Self {
            model: MassModel::default(),
            bin_integral: settings.bin_integral,
            minimizer: settings.minimizer,
        }
    }

    pub fn free_parameters(&self) -> usize {
        self.model.parameters.iter().filter(|p| p.vary).count()
    }

    pub fn fit(&self, histogram: &Histogram, range: (f64, f64)) -> Result<FitResult> {
        let data = histogram.fit_data(range.0, range.1);
        let free = self.free_parameters();

        if histogram.is_empty() || data.len() <= free {
            return Err(EffError::InsufficientStatistics {
                histogram: histogram.name.clone(),
                entries: histogram.entries(),
                points: data.len(),
            });
        }

        let bin_integral = self.bin_integral;
        let minimum = minimizer::minimize(
            &data,
            |i, p: &[f64]| {
                if bin_integral {
                    MassModel::bin_average(data.bins[i].0, data.bins[i].1, p)
                } else {
                    MassModel::shape(data.x[i], p)
                }
            },
            &self.model.initial_values(),
            &self.model.bounds(),
            &self
                .model
                .parameters
                .iter()
                .map(|p| p.vary)
                .collect::<Vec<bool>>(),
            &self.minimizer,
        )?;

        let mut parameters = self.model.parameters.clone();
        for (k, parameter) in parameters.iter_mut().enumerate() {
            parameter.value = Some(minimum.parameters[k]);
            parameter.uncertainty = Some(minimum.uncertainties[k]);
        }

        let ndf = data.len() - free;
        let mut result = FitResult {
            parameters,
            range,
            chi2: minimum.chi2,
            ndf,
            probability: 0.0,
            converged: minimum.converged,
            iterations: minimum.iterations,
        };

        if result.converged && result.within_bounds() && result.chi2.is_finite() {
            result.probability = chi2_probability(result.chi2, ndf)?;
        } else {
            log::warn!(
                "Fit of '{}' in [{}, {}] did not converge to a valid minimum: {}",
                histogram.name,
                range.0,
                range.1,
                minimum.termination
            );
        }

        log::debug!(
            "Fit '{}' in [{}, {}]: chi2/ndf = {:.3}/{} p = {:.4} after {} iterations",
            histogram.name,
            range.0,
            range.1,
            result.chi2,
            result.ndf,
            result.probability,
            result.iterations
        );

        Ok(result)
    }
}
