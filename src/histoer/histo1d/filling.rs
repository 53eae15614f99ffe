use std::time::Instant;

use super::histogram1d::{Histogram, HistogramBinning};
use crate::cutter::cuts::Selection;
use crate::dataset::Dataset;
use crate::error::Result;

impl Histogram {
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        if value >= self.range.0 && value < self.range.1 {
            let index = ((value - self.range.0) / self.bin_width) as usize;
            if index < self.bins.len() {
                self.bins[index] += weight;
                self.sumw2[index] += weight * weight;
            }
        } else if value >= self.range.1 {
            self.overflow += 1;
        } else if value < self.range.0 {
            self.underflow += 1;
        }
    }

    pub fn fill_from_values<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for value in values {
            self.fill(value);
        }
    }

    /// Builds a fresh histogram of `column` for the events passing `selection`.
    pub fn from_dataset(
        name: &str,
        binning: &HistogramBinning,
        dataset: &Dataset,
        selection: &Selection,
        column: &str,
    ) -> Result<Self> {
        let start = Instant::now();

        let mut histogram = Histogram::with_binning(name, binning);
        let values = dataset.select(selection, column)?;
        histogram.fill_from_values(values);

        log::debug!(
            "Filled histogram '{}' with {} entries in {:?}",
            histogram.name,
            histogram.entries(),
            start.elapsed()
        );

        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_tracks_flow_and_sumw2() {
        let mut hist = Histogram::new("h", 4, (0.0, 4.0));
        hist.fill_from_values([0.5, 0.7, 3.99, -1.0, 4.0, 10.0]);
        hist.fill_weighted(1.5, 2.0);

        assert_eq!(hist.bins, vec![2.0, 2.0, 0.0, 1.0]);
        assert_eq!(hist.sumw2, vec![2.0, 4.0, 0.0, 1.0]);
        assert_eq!(hist.underflow, 1);
        assert_eq!(hist.overflow, 2);
    }

    #[test]
    fn nan_values_are_dropped() {
        let mut hist = Histogram::new("h", 4, (0.0, 4.0));
        hist.fill(f64::NAN);
        assert_eq!(hist.entries(), 0.0);
        assert_eq!(hist.underflow + hist.overflow, 0);
    }
}
