use std::time::Instant;

use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::binning::{BinCell, Variable};
use crate::config::Config;
use crate::cutter::cuts::Selection;
use crate::dataset::Dataset;
use crate::error::{EffError, Result};
use crate::fitter::fit_settings::FitSettings;
use crate::fitter::models::mass::SignalYield;
use crate::fitter::{FitOutcome, FitQuality, Fitter, RetryPolicy};
use crate::histoer::{Histogram, HistogramBinning};

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EfficiencyRecord {
    pub value: f64,
    pub error: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<FitQuality>,
}

/// `N / D` with `err = sqrt((1/D)^2 varN + (N/D^2)^2 varD)`.
///
/// Numerator and denominator are treated as independent even though the
/// numerator events are a subset of the denominator ones.
pub fn efficiency_from_yields(
    label: &str,
    numerator: SignalYield,
    denominator: SignalYield,
) -> Result<(f64, f64)> {
    let (n, d) = (numerator.value, denominator.value);
    if d == 0.0 || !d.is_finite() || !n.is_finite() {
        return Err(EffError::UndefinedEfficiency {
            label: label.to_owned(),
        });
    }

    let value = n / d;
    let error = ((1.0 / d).powi(2) * numerator.variance
        + (n / d.powi(2)).powi(2) * denominator.variance)
        .sqrt();

    Ok((value, error))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Numerator,
    Denominator,
}

impl Role {
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Numerator => "NUM",
            Role::Denominator => "DEN",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Role::Numerator => "num.json",
            Role::Denominator => "den.json",
        }
    }
}

/// A filled histogram and its fit, if the fit could run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramFit {
    pub histogram: Histogram,
    pub fit: Option<FitOutcome>,
}

/// Everything computed for one bin. Nothing here has been written anywhere yet.
#[derive(Debug)]
pub struct BinComputation {
    pub cell: BinCell,
    pub numerator: HistogramFit,
    pub denominator: HistogramFit,
    pub efficiency: Result<EfficiencyRecord>,
}

impl BinComputation {
    pub fn quality(&self) -> Option<FitQuality> {
        let qualities = [&self.numerator.fit, &self.denominator.fit];
        let mut quality = None;
        for outcome in qualities.into_iter().flatten() {
            quality = match (quality, outcome.quality) {
                (Some(FitQuality::Degraded), _) | (_, FitQuality::Degraded) => {
                    Some(FitQuality::Degraded)
                }
                _ => Some(FitQuality::Good),
            };
        }
        quality
    }

    pub fn is_degraded(&self) -> bool {
        self.quality() == Some(FitQuality::Degraded)
    }
}

/// Splits bin-local fit failures from fatal ones.
fn isolate(fit: Result<FitOutcome>) -> Result<(Option<FitOutcome>, Option<EffError>)> {
    match fit {
        Ok(outcome) => Ok((Some(outcome), None)),
        Err(e) if e.is_bin_local() => Ok((None, Some(e))),
        Err(e) => Err(e),
    }
}

pub struct EfficiencyExtractor<'a> {
    pub dataset: &'a Dataset,
    pub mass_column: String,
    pub binning: HistogramBinning,
    pub denominator: Selection,
    pub numerator: Selection,
    pub settings: FitSettings,
    pub fitter: Fitter,
    pub retry: RetryPolicy,
    pub parallel: bool,
    pub report_quality: bool,
}

impl<'a> EfficiencyExtractor<'a> {
    pub fn new(dataset: &'a Dataset, config: &Config) -> Result<Self> {
        let denominator = Selection::parse(&config.selection.denominator)?;
        let numerator = denominator.and(&Selection::parse(&config.selection.numerator_extra)?);

        Ok(Self {
            dataset,
            mass_column: config.mass_column.clone(),
            binning: config.histogram,
            denominator,
            numerator,
            settings: config.fit.clone(),
            fitter: Fitter::new(&config.fit),
            retry: config.retry,
            parallel: config.parallel,
            report_quality: config.report_quality,
        })
    }

    /// Every column the run will touch, checked once before any bin runs.
    pub fn required_columns(&self, variables: &[Variable]) -> Vec<String> {
        let mut columns = vec![self.mass_column.clone()];
        let referenced = self
            .numerator
            .required_columns()
            .into_iter()
            .chain(variables.iter().flat_map(Variable::columns));
        for column in referenced {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    /// Bins of `variable` in enumeration order. Only dataset errors abort;
    /// fit problems stay inside the bin's `efficiency`.
    pub fn compute(
        &self,
        variable: &Variable,
        progress: &ProgressBar,
    ) -> Result<Vec<BinComputation>> {
        let start = Instant::now();
        let cells = variable.cells();

        let compute = |cell: BinCell| {
            let computation = self.compute_cell(cell);
            progress.inc(1);
            computation
        };

        let computations = if self.parallel {
            cells
                .into_par_iter()
                .map(compute)
                .collect::<Result<Vec<_>>>()?
        } else {
            cells
                .into_iter()
                .map(compute)
                .collect::<Result<Vec<_>>>()?
        };

        log::debug!(
            "Computed {} bins of '{}' in {:?}",
            computations.len(),
            variable.name(),
            start.elapsed()
        );

        Ok(computations)
    }

    fn fill(&self, cell: &BinCell, role: Role) -> Result<Histogram> {
        let base = match role {
            Role::Numerator => &self.numerator,
            Role::Denominator => &self.denominator,
        };
        Histogram::from_dataset(
            &cell.histogram_name(role.tag()),
            &self.binning,
            self.dataset,
            &base.and(&cell.selection),
            &self.mass_column,
        )
    }

    pub fn compute_cell(&self, cell: BinCell) -> Result<BinComputation> {
        let numerator = self.fill(&cell, Role::Numerator)?;
        let denominator = self.fill(&cell, Role::Denominator)?;

        let (num_fit, num_error) = isolate(self.retry.fit(
            &self.fitter,
            &numerator,
            self.settings.numerator_range,
        ))?;
        let (den_fit, den_error) = isolate(self.retry.fit(
            &self.fitter,
            &denominator,
            self.settings.denominator_range,
        ))?;

        let efficiency = match (&num_fit, &den_fit, den_error, num_error) {
            (Some(num), Some(den), _, _) => {
                let bin_width = numerator.binning().bin_width();
                efficiency_from_yields(
                    &cell.path(),
                    num.result.signal_yield(bin_width),
                    den.result.signal_yield(bin_width),
                )
                .map(|(value, error)| EfficiencyRecord {
                    value,
                    error,
                    quality: None,
                })
            }
            (_, _, Some(e), _) | (_, _, None, Some(e)) => Err(e),
            (_, _, None, None) => Err(EffError::Fit(format!(
                "no fit result for bin {}",
                cell.path()
            ))),
        };

        let mut computation = BinComputation {
            cell,
            numerator: HistogramFit {
                histogram: numerator,
                fit: num_fit,
            },
            denominator: HistogramFit {
                histogram: denominator,
                fit: den_fit,
            },
            efficiency,
        };

        if self.report_quality {
            let quality = computation.quality();
            if let Ok(record) = computation.efficiency.as_mut() {
                record.quality = quality;
            }
        }

        Ok(computation)
    }
}
