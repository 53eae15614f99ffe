use polars::error::PolarsError;
use std::error::Error;
use std::fmt::Display;

pub type Result<T> = std::result::Result<T, EffError>;

#[derive(Debug)]
pub enum EffError {
    File(std::io::Error),
    DataFrame(PolarsError),
    Config(serde_yaml::Error),
    InvalidSetting(String),
    Json(serde_json::Error),
    Selection(String),
    Binning(String),
    MissingColumn(String),
    InsufficientStatistics {
        histogram: String,
        entries: f64,
        points: usize,
    },
    UndefinedEfficiency {
        label: String,
    },
    Fit(String),
}

impl EffError {
    /// Errors that only invalidate a single bin. Everything else aborts the run.
    pub fn is_bin_local(&self) -> bool {
        matches!(
            self,
            EffError::InsufficientStatistics { .. }
                | EffError::UndefinedEfficiency { .. }
                | EffError::Fit(_)
        )
    }
}

impl From<std::io::Error> for EffError {
    fn from(err: std::io::Error) -> EffError {
        EffError::File(err)
    }
}

impl From<PolarsError> for EffError {
    fn from(err: PolarsError) -> EffError {
        EffError::DataFrame(err)
    }
}

impl From<serde_yaml::Error> for EffError {
    fn from(err: serde_yaml::Error) -> EffError {
        EffError::Config(err)
    }
}

impl From<serde_json::Error> for EffError {
    fn from(err: serde_json::Error) -> EffError {
        EffError::Json(err)
    }
}

impl Display for EffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffError::File(x) => write!(f, "Run had a file I/O error: {x}"),
            EffError::DataFrame(x) => write!(f, "Run had an error using polars: {x}"),
            EffError::Config(x) => write!(f, "Could not parse the configuration: {x}"),
            EffError::InvalidSetting(x) => write!(f, "Invalid setting: {x}"),
            EffError::Json(x) => write!(f, "Could not serialize results: {x}"),
            EffError::Selection(x) => write!(f, "Invalid selection expression: {x}"),
            EffError::Binning(x) => write!(f, "Invalid binning: {x}"),
            EffError::MissingColumn(x) => {
                write!(f, "Dataset has no column named '{x}'")
            }
            EffError::InsufficientStatistics {
                histogram,
                entries,
                points,
            } => write!(
                f,
                "Insufficient statistics in '{histogram}': {entries} entries, {points} usable bins"
            ),
            EffError::UndefinedEfficiency { label } => write!(
                f,
                "Undefined efficiency in bin {label}: denominator signal yield is zero"
            ),
            EffError::Fit(x) => write!(f, "Fit failed: {x}"),
        }
    }
}

impl Error for EffError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EffError::File(x) => Some(x),
            EffError::DataFrame(x) => Some(x),
            EffError::Config(x) => Some(x),
            EffError::Json(x) => Some(x),
            _ => None,
        }
    }
}
