use super::histogram1d::Histogram;
use crate::fitter::common::Data;

impl Histogram {
    pub fn get_bin_edges(&self) -> Vec<f64> {
        (0..=self.bins.len())
            .map(|i| self.range.0 + i as f64 * self.bin_width)
            .collect()
    }

    pub fn get_bin_centers(&self) -> Vec<f64> {
        (0..self.bins.len())
            .map(|i| self.range.0 + (i as f64 + 0.5) * self.bin_width)
            .collect()
    }

    pub fn get_bin_index(&self, x: f64) -> Option<usize> {
        if x < self.range.0 || x > self.range.1 {
            return None;
        }

        let bin_index: usize = ((x - self.range.0) / self.bin_width).floor() as usize;

        Some(bin_index.min(self.bins.len().saturating_sub(1)))
    }

    /// Sum of weights inside the histogram range.
    pub fn entries(&self) -> f64 {
        self.bins.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries() <= 0.0
    }

    /// Points for a chi2 fit over `[start_x, end_x]`: bins whose centre lies in
    /// the range and that have a non-zero error. Empty bins are skipped.
    pub fn fit_data(&self, start_x: f64, end_x: f64) -> Data {
        let mut data = Data::default();

        for (bin, center) in self.get_bin_centers().into_iter().enumerate() {
            if center < start_x || center > end_x || self.sumw2[bin] <= 0.0 {
                continue;
            }
            let low = self.range.0 + bin as f64 * self.bin_width;
            data.x.push(center);
            data.y.push(self.bins[bin]);
            data.sigma.push(self.sumw2[bin].sqrt());
            data.bins.push((low, low + self.bin_width));
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_and_centers() {
        let hist = Histogram::new("h", 4, (0.0, 2.0));
        assert_eq!(hist.get_bin_edges(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(hist.get_bin_centers(), vec![0.25, 0.75, 1.25, 1.75]);
        assert_eq!(hist.get_bin_index(0.6), Some(1));
        assert_eq!(hist.get_bin_index(2.0), Some(3));
        assert_eq!(hist.get_bin_index(2.1), None);
    }

    #[test]
    fn fit_data_skips_empty_bins_and_respects_range() {
        let mut hist = Histogram::new("h", 4, (0.0, 2.0));
        hist.fill_from_values([0.1, 0.2, 0.3, 0.3, 1.2, 1.9]);

        let data = hist.fit_data(0.0, 1.5);
        assert_eq!(data.x, vec![0.25, 1.25]);
        assert_eq!(data.y, vec![4.0, 1.0]);
        assert_eq!(data.sigma, vec![2.0, 1.0]);
        assert_eq!(data.bins, vec![(0.0, 0.5), (1.0, 1.5)]);
    }
}
