use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::efficiency::{BinComputation, HistogramFit, Role};
use crate::error::{EffError, Result};
use crate::fitter::FitQuality;

/// Plain text fit diagnostics, one line per fit or failure.
pub struct FitLog<W: Write> {
    writer: W,
}

impl FitLog<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FitLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn record_fit(
        &mut self,
        variable: &str,
        label: &str,
        role: Role,
        fit: &HistogramFit,
    ) -> Result<()> {
        let Some(outcome) = &fit.fit else {
            return Ok(());
        };
        let result = &outcome.result;
        let status = match outcome.quality {
            FitQuality::Good => "ok",
            FitQuality::Degraded => "degraded",
        };

        writeln!(
            self.writer,
            "{variable} {label} {} range=[{}, {}] chi2={:.4} ndf={} prob={:.6} status={status} attempts={} converged={}",
            role.tag(),
            result.range.0,
            result.range.1,
            result.chi2,
            result.ndf,
            result.probability,
            outcome.attempts,
            result.converged
        )?;
        Ok(())
    }

    pub fn record_failure(&mut self, variable: &str, label: &str, error: &EffError) -> Result<()> {
        writeln!(self.writer, "{variable} {label} FAILED {error}")?;
        Ok(())
    }

    pub fn record_bin(&mut self, variable: &str, bin: &BinComputation) -> Result<()> {
        let label = bin.cell.path();
        self.record_fit(variable, &label, Role::Numerator, &bin.numerator)?;
        self.record_fit(variable, &label, Role::Denominator, &bin.denominator)?;
        if let Err(e) = &bin.efficiency {
            self.record_failure(variable, &label, e)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
