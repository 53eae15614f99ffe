use super::main_fitter::{FitResult, Fitter};
use crate::error::Result;
use crate::histoer::Histogram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum FitQuality {
    Good,
    /// Accepted below the probability threshold.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FitOutcome {
    pub result: FitResult,
    pub attempts: usize,
    pub quality: FitQuality,
}

/// Re-fits low probability fits on a shrinking mass range.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub min_probability: f64,
    pub step: f64,
    /// The range never shrinks past this window around the resonances.
    pub resonance_window: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_probability: 0.01,
            step: 0.01,
            resonance_window: (1.82, 1.99),
        }
    }
}

impl RetryPolicy {
    pub fn is_acceptable(&self, result: &FitResult) -> bool {
        result.probability >= self.min_probability
    }

    /// Next fit range, moving in whichever edge lies farther outside the
    /// resonance window. `None` once both edges are inside it, or when the
    /// step no longer changes the range.
    pub fn narrow(&self, range: (f64, f64)) -> Option<(f64, f64)> {
        let (window_lo, window_hi) = self.resonance_window;
        let (lo, hi) = range;

        let outside_lo = window_lo - lo;
        let outside_hi = hi - window_hi;
        if outside_lo <= 0.0 && outside_hi <= 0.0 || self.step.is_nan() || self.step <= 0.0 {
            return None;
        }

        let next = if outside_hi >= outside_lo {
            (lo, (hi - self.step).max(window_hi))
        } else {
            ((lo + self.step).min(window_lo), hi)
        };

        (next.0 < next.1 && next != range).then_some(next)
    }

    pub fn fit(
        &self,
        fitter: &Fitter,
        histogram: &Histogram,
        range: (f64, f64),
    ) -> Result<FitOutcome> {
        let mut result = fitter.fit(histogram, range)?;
        let mut attempts = 1;

        if self.is_acceptable(&result) {
            return Ok(FitOutcome {
                result,
                attempts,
                quality: FitQuality::Good,
            });
        }

        if self.enabled {
            let mut current = range;
            while let Some(next) = self.narrow(current) {
                attempts += 1;
                current = next;

                match fitter.fit(histogram, next) {
                    Ok(refit) => {
                        log::debug!(
                            "Retry {attempts} of '{}' in [{}, {}]: p = {:.4}",
                            histogram.name,
                            next.0,
                            next.1,
                            refit.probability
                        );
                        result = refit;
                        if self.is_acceptable(&result) {
                            return Ok(FitOutcome {
                                result,
                                attempts,
                                quality: FitQuality::Good,
                            });
                        }
                    }
                    Err(e) => {
                        log::warn!("Retry of '{}' stopped: {e}", histogram.name);
                        break;
                    }
                }
            }
        }

        log::warn!(
            "Accepting degraded fit of '{}' in [{}, {}]: p = {:.4} after {attempts} attempt(s)",
            histogram.name,
            result.range.0,
            result.range.1,
            result.probability
        );

        Ok(FitOutcome {
            result,
            attempts,
            quality: FitQuality::Degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitter::fit_settings::FitSettings;
    use crate::histoer::HistogramBinning;

    #[test]
    fn narrows_the_far_side_first_and_stops_at_the_window() {
        let policy = RetryPolicy::default();

        let (lo, hi) = policy.narrow((1.8, 2.1)).unwrap();
        assert_eq!(lo, 1.8);
        assert!((hi - 2.09).abs() < 1e-12);

        let mut range = (1.8, 2.02);
        let mut steps = 0;
        while let Some(next) = policy.narrow(range) {
            assert!(next.0 >= range.0 && next.1 <= range.1);
            assert!(next.1 - next.0 < range.1 - range.0);
            range = next;
            steps += 1;
        }
        assert_eq!(range, (1.82, 1.99));
        assert!(steps >= 5);
    }

    #[test]
    fn step_below_float_resolution_does_not_narrow() {
        let policy = RetryPolicy {
            enabled: true,
            step: 1e-18,
            ..Default::default()
        };
        assert_eq!(policy.narrow((1.8, 2.1)), None);

        let nan = RetryPolicy {
            step: f64::NAN,
            ..Default::default()
        };
        assert_eq!(nan.narrow((1.8, 2.1)), None);
    }

    #[test]
    fn tiny_step_retry_terminates_after_one_fit() {
        let hist = badly_described_histogram();
        let fitter = Fitter::new(&FitSettings::default());
        let policy = RetryPolicy {
            enabled: true,
            step: 1e-18,
            ..Default::default()
        };
        let outcome = policy.fit(&fitter, &hist, (1.8, 2.1)).unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.quality, FitQuality::Degraded);
    }

    #[test]
    fn range_inside_the_window_cannot_narrow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.narrow((1.85, 1.95)), None);
        assert_eq!(policy.narrow((1.82, 1.99)), None);
    }

    /// Flat spectrum with one sharp spike the model cannot describe.
    fn badly_described_histogram() -> Histogram {
        let mut hist = Histogram::with_binning("bin0 DEN", &HistogramBinning::default());
        for center in hist.get_bin_centers() {
            hist.fill_weighted(center, 100.0);
        }
        hist.sumw2 = hist.bins.clone();
        let spike = hist.get_bin_index(2.08).unwrap_or(0);
        hist.bins[spike] = 2000.0;
        hist.sumw2[spike] = 2000.0;
        hist
    }

    #[test]
    fn disabled_policy_accepts_degraded_fit_once() {
        let hist = badly_described_histogram();
        let fitter = Fitter::new(&FitSettings::default());
        let outcome = RetryPolicy::default()
            .fit(&fitter, &hist, (1.8, 2.1))
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.quality, FitQuality::Degraded);
        assert_eq!(outcome.result.range, (1.8, 2.1));
    }

    #[test]
    fn enabled_policy_cuts_away_what_the_model_cannot_fit() {
        let hist = badly_described_histogram();
        let fitter = Fitter::new(&FitSettings::default());
        let policy = RetryPolicy {
            enabled: true,
            ..Default::default()
        };
        let outcome = policy.fit(&fitter, &hist, (1.8, 2.1)).unwrap();

        assert!(outcome.attempts > 1);
        assert!(outcome.result.range.1 < 2.08);
        assert_eq!(outcome.result.range.0, 1.8);
    }
}
