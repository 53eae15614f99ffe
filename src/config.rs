use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::binning::{Axis, Variable};
use crate::error::{EffError, Result};
use crate::fitter::RetryPolicy;
use crate::fitter::fit_settings::FitSettings;
use crate::histoer::HistogramBinning;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub denominator: String,
    /// Added on top of the denominator selection for the numerator.
    pub numerator_extra: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            denominator: "ds_hasphi & mu1_muonid_soft & mu2_muonid_soft & sv_prob>0.1 & sv_ls>2 & sv_cos>0.999 & hlt_dimuon0_phi_barrel & pi_pt>1.2 & ds_pt>8".to_owned(),
            numerator_extra: "hlt_doublemu3_trk_tau3mu".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub archive: PathBuf,
    pub json: PathBuf,
    pub fit_log: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("eff_from_ds.tar.gz"),
            json: PathBuf::from("eff_from_ds.json"),
            fit_log: PathBuf::from("auto_fit.log"),
        }
    }
}

impl OutputConfig {
    /// Same file names, placed under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        let names = Self::default();
        Self {
            archive: dir.join(names.archive),
            json: dir.join(names.json),
            fit_log: dir.join(names.fit_log),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    pub input: PathBuf,
    pub mass_column: String,
    pub histogram: HistogramBinning,
    pub selection: SelectionConfig,
    pub fit: FitSettings,
    pub retry: RetryPolicy,
    pub variables: Vec<Variable>,
    pub output: OutputConfig,
    /// Compute bins on the rayon pool. Results are recorded in bin order either way.
    pub parallel: bool,
    /// Add a `quality` field to every record of the JSON output.
    pub report_quality: bool,
}

impl Default for Config {
    fn default() -> Self {
        let pt = Axis::new("ds_pt", &[8.0, 15.0, 35.0, 1000.0]);
        let eta = Axis::new("ds_eta", &[0.0, 0.7, 1.5]);

        Self {
            input: PathBuf::from("ds_onia2016.parquet"),
            mass_column: "ds_mass".to_owned(),
            histogram: HistogramBinning::default(),
            selection: SelectionConfig::default(),
            fit: FitSettings::default(),
            retry: RetryPolicy::default(),
            variables: vec![
                Variable::OneD {
                    name: "pt".to_owned(),
                    axis: pt.clone(),
                },
                Variable::OneD {
                    name: "eta".to_owned(),
                    axis: eta.clone(),
                },
                Variable::TwoD {
                    name: "pt_eta".to_owned(),
                    inner: pt,
                    outer: eta,
                },
            ],
            output: OutputConfig::default(),
            parallel: false,
            report_quality: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.histogram.range;
        if self.histogram.bins == 0 || !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(EffError::Binning(format!(
                "histogram needs at least one bin over a non-empty range, got {} bins over [{lo}, {hi}]",
                self.histogram.bins
            )));
        }

        for (name, range) in [
            ("numerator", self.fit.numerator_range),
            ("denominator", self.fit.denominator_range),
        ] {
            if !range.0.is_finite()
                || !range.1.is_finite()
                || range.0 >= range.1
                || range.0 < lo
                || range.1 > hi
            {
                return Err(EffError::Binning(format!(
                    "{name} fit range [{}, {}] must be non-empty and inside [{lo}, {hi}]",
                    range.0, range.1
                )));
            }
        }

        let retry = &self.retry;
        if !retry.step.is_finite() || retry.step <= 0.0 {
            return Err(EffError::InvalidSetting(format!(
                "retry step must be a positive number, got {}",
                retry.step
            )));
        }
        if !(0.0..=1.0).contains(&retry.min_probability) {
            return Err(EffError::InvalidSetting(format!(
                "retry min_probability must lie in [0, 1], got {}",
                retry.min_probability
            )));
        }

        let mut names: Vec<&str> = Vec::new();
        for variable in &self.variables {
            if names.contains(&variable.name()) {
                return Err(EffError::Binning(format!(
                    "variable '{}' is defined twice",
                    variable.name()
                )));
            }
            names.push(variable.name());
            variable.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_complete() {
        let config = Config::default();
        config.validate().unwrap();

        let names: Vec<&str> = config.variables.iter().map(Variable::name).collect();
        assert_eq!(names, vec!["pt", "eta", "pt_eta"]);
        assert_eq!(config.fit.numerator_range, (1.8, 2.02));
        assert_eq!(config.fit.denominator_range, (1.8, 2.10));
        assert!(!config.retry.enabled);
        assert_eq!(config.output.json, PathBuf::from("eff_from_ds.json"));
    }

    #[test]
    fn partial_yaml_keeps_the_other_defaults() {
        let config: Config = serde_yaml::from_str(
            "
input: other.parquet
parallel: true
retry:
  enabled: true
fit:
  numerator_range: [1.82, 2.0]
",
        )
        .unwrap();

        assert_eq!(config.input, PathBuf::from("other.parquet"));
        assert!(config.parallel);
        assert!(config.retry.enabled);
        assert_eq!(config.retry.min_probability, 0.01);
        assert_eq!(config.fit.numerator_range, (1.82, 2.0));
        assert_eq!(config.fit.denominator_range, (1.8, 2.10));
        assert_eq!(config.variables.len(), 3);
    }

    #[test]
    fn yaml_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config {
            report_quality: true,
            ..Default::default()
        };
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn validation_catches_bad_setups() {
        let mut config = Config::default();
        config.fit.numerator_range = (1.7, 2.0);
        assert!(matches!(config.validate(), Err(EffError::Binning(_))));

        let mut config = Config::default();
        let duplicate = config.variables[0].clone();
        config.variables.push(duplicate);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.variables[1] = Variable::OneD {
            name: "eta".to_owned(),
            axis: Axis::new("ds_eta", &[1.5, 0.7]),
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.histogram.bins = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_nan_fit_edges() {
        let mut config = Config::default();
        config.fit.denominator_range = (1.8, f64::NAN);
        assert!(matches!(config.validate(), Err(EffError::Binning(_))));

        let mut config = Config::default();
        config.fit.numerator_range = (f64::NAN, 2.0);
        assert!(matches!(config.validate(), Err(EffError::Binning(_))));
    }

    #[test]
    fn validation_rejects_unusable_retry_settings() {
        for step in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.retry.step = step;
            assert!(
                matches!(config.validate(), Err(EffError::InvalidSetting(_))),
                "step {step} accepted"
            );
        }

        for min_probability in [-0.1, 1.5, f64::NAN] {
            let mut config = Config::default();
            config.retry.min_probability = min_probability;
            assert!(
                matches!(config.validate(), Err(EffError::InvalidSetting(_))),
                "min_probability {min_probability} accepted"
            );
        }
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "variables: 12").unwrap();
        assert!(matches!(Config::load(&path), Err(EffError::Config(_))));
        assert!(matches!(
            Config::load(&dir.path().join("missing.yaml")),
            Err(EffError::File(_))
        ));
    }
}
