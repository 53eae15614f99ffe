use std::fs::File;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use log::{info, warn};
use tar::{Builder, Header};

use crate::efficiency::{BinComputation, HistogramFit, Role};
use crate::error::Result;

/// Gzipped tar of every filled histogram and its fit, laid out as
/// `variable/[outer_label/]bin{i}/{num,den}.json`.
pub struct HistogramArchive {
    builder: Builder<GzEncoder<File>>,
    entries: usize,
}

impl HistogramArchive {
    pub fn create(path: &Path) -> Result<Self> {
        info!("Writing histograms to {}", path.display());
        let file = File::create(path)?;
        Ok(Self {
            builder: Builder::new(GzEncoder::new(file, Compression::default())),
            entries: 0,
        })
    }

    pub fn append(&mut self, path: &str, contents: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        self.builder.append_data(&mut header, path, contents)?;
        self.entries += 1;
        Ok(())
    }

    pub fn append_histogram(&mut self, dir: &str, role: Role, fit: &HistogramFit) -> Result<()> {
        let contents = serde_json::to_vec_pretty(fit)?;
        self.append(&format!("{dir}/{}", role.file_name()), &contents)
    }

    /// Both histograms of a bin, whatever happened to their fits.
    pub fn append_bin(&mut self, variable: &str, bin: &BinComputation) -> Result<()> {
        let dir = bin.cell.archive_dir(variable);
        self.append_histogram(&dir, Role::Numerator, &bin.numerator)?;
        self.append_histogram(&dir, Role::Denominator, &bin.denominator)
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn finish(self) -> Result<()> {
        if self.is_empty() {
            warn!("Histogram archive is empty");
        }
        let entries = self.len();
        self.builder.into_inner()?.finish()?;
        info!("Histogram archive closed with {entries} entries");
        Ok(())
    }
}
