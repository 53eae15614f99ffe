use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::archive::HistogramArchive;
use crate::binning::Variable;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::efficiency::{BinComputation, EfficiencyExtractor};
use crate::error::{EffError, Result};
use crate::fit_log::FitLog;
use crate::results::ResultTree;

#[derive(Debug)]
pub struct BinFailure {
    pub variable: String,
    pub label: String,
    pub error: EffError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub tree: ResultTree,
    /// Bins left out of the tree.
    pub failures: Vec<BinFailure>,
    /// `variable/label` of bins whose efficiency rests on a degraded fit.
    pub degraded: Vec<String>,
    pub bins: usize,
}

fn progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => progress.set_style(style.progress_chars("=>-")),
        Err(e) => warn!("Falling back to the default progress style: {e}"),
    }
    progress
}

/// Loads the dataset named in `config` and runs every variable.
pub fn run(config: &Config) -> Result<RunReport> {
    config.validate()?;
    let dataset = Dataset::load(&config.input)?;
    run_with_dataset(config, &dataset)
}

pub fn run_with_dataset(config: &Config, dataset: &Dataset) -> Result<RunReport> {
    let start = Instant::now();
    config.validate()?;

    log::debug!("Running with configuration:\n{}", config.to_yaml()?);

    let extractor = EfficiencyExtractor::new(dataset, config)?;
    dataset.require_columns(&extractor.required_columns(&config.variables))?;
    if dataset.height() == 0 {
        warn!("Dataset holds no events, every bin will fail");
    }

    let mut archive = HistogramArchive::create(&config.output.archive)?;
    let mut fit_log = FitLog::create(&config.output.fit_log)?;
    let mut report = RunReport::default();

    let total = config.variables.iter().map(|v| v.cells().len()).sum();
    let progress = progress_bar(total);

    for variable in &config.variables {
        let name = variable.name();
        progress.set_message(name.to_owned());
        info!("Computing efficiency in bins of '{name}'");

        report
            .tree
            .add_variable(name, matches!(variable, Variable::TwoD { .. }));

        for bin in extractor.compute(variable, &progress)? {
            record(&mut report, name, bin, &mut archive, &mut fit_log)?;
        }
    }

    progress.finish_and_clear();

    archive.finish()?;
    fit_log.flush()?;
    report.tree.write_json(&config.output.json)?;

    info!(
        "Processed {} bins in {:?}: {} failed, {} degraded",
        report.bins,
        start.elapsed(),
        report.failures.len(),
        report.degraded.len()
    );

    Ok(report)
}

fn record<W: std::io::Write>(
    report: &mut RunReport,
    variable: &str,
    bin: BinComputation,
    archive: &mut HistogramArchive,
    fit_log: &mut FitLog<W>,
) -> Result<()> {
    report.bins += 1;
    archive.append_bin(variable, &bin)?;
    fit_log.record_bin(variable, &bin)?;

    if let Some(outer) = &bin.cell.outer {
        report.tree.ensure_parent(variable, &outer.label);
    }

    let label = bin.cell.path();
    let degraded = bin.is_degraded();

    match bin.efficiency {
        Ok(record) => {
            info!(
                "{variable} {label}: efficiency = {:.4} +- {:.4}",
                record.value, record.error
            );
            if degraded {
                warn!("{variable} {label}: efficiency rests on a degraded fit");
                report.degraded.push(format!("{variable}/{label}"));
            }
            report.tree.insert(variable, &bin.cell, record);
        }
        Err(e) => {
            error!("{variable} {label}: {e}, bin skipped");
            report.failures.push(BinFailure {
                variable: variable.to_owned(),
                label,
                error: e,
            });
        }
    }

    Ok(())
}
