use crate::cutter::cuts::Selection;
use crate::error::{EffError, Result};

/// Renders a bin edge. Axes with any fractional edge print whole numbers with
/// a trailing `.0`, so `[0, 0.7, 1.5]` gives `"0.0,0.7"` while `[8, 15]` gives `"8,15"`.
fn format_edge(value: f64, integral_axis: bool) -> String {
    if !integral_axis && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn bin_label(lower: &str, upper: &str) -> String {
    format!("{lower},{upper}")
}

/// Inverse of the label format, exact for every label this module produces.
pub fn parse_bin_label(label: &str) -> Result<(f64, f64)> {
    let (lower, upper) = label
        .split_once(',')
        .ok_or_else(|| EffError::Binning(format!("'{label}' is not of the form 'lower,upper'")))?;

    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| EffError::Binning(format!("'{label}': {e}")))
    };

    Ok((parse(lower)?, parse(upper)?))
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Axis {
    pub column: String,
    pub edges: Vec<f64>,
}

impl Axis {
    pub fn new(column: &str, edges: &[f64]) -> Self {
        Self {
            column: column.to_owned(),
            edges: edges.to_vec(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.edges.len() < 2 {
            return Err(EffError::Binning(format!(
                "'{}' needs at least two edges, got {}",
                self.column,
                self.edges.len()
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err(EffError::Binning(format!(
                "'{}' has a non-finite edge",
                self.column
            )));
        }
        if self.edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EffError::Binning(format!(
                "edges of '{}' must be strictly increasing: {:?}",
                self.column, self.edges
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_integral(&self) -> bool {
        self.edges.iter().all(|e| e.fract() == 0.0)
    }

    pub fn bins(&self) -> Vec<Bin> {
        let integral = self.is_integral();
        self.edges
            .windows(2)
            .enumerate()
            .map(|(index, w)| Bin {
                index,
                lower: w[0],
                upper: w[1],
                label: bin_label(
                    &format_edge(w[0], integral),
                    &format_edge(w[1], integral),
                ),
            })
            .collect()
    }

    /// `lower <= |column| <= upper` for one bin of this axis.
    pub fn predicate(&self, bin: &Bin) -> Selection {
        Selection::abs_within(&self.column, bin.lower, bin.upper)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Bin {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub label: String,
}

/// A kinematic variable to measure the efficiency in. For `TwoD` the result
/// tree is keyed by the outer bin first.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variable {
    OneD {
        name: String,
        axis: Axis,
    },
    TwoD {
        name: String,
        inner: Axis,
        outer: Axis,
    },
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::OneD { name, .. } | Variable::TwoD { name, .. } => name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Variable::OneD { axis, .. } => axis.validate(),
            Variable::TwoD { inner, outer, .. } => {
                inner.validate()?;
                outer.validate()
            }
        }
    }

    pub fn columns(&self) -> Vec<String> {
        match self {
            Variable::OneD { axis, .. } => vec![axis.column.clone()],
            Variable::TwoD { inner, outer, .. } => vec![inner.column.clone(), outer.column.clone()],
        }
    }

    /// Every bin of the variable with its predicate. 2D cells are ordered
    /// outer bin major, inner bin minor.
    pub fn cells(&self) -> Vec<BinCell> {
        match self {
            Variable::OneD { axis, .. } => axis
                .bins()
                .into_iter()
                .map(|bin| BinCell {
                    selection: axis.predicate(&bin),
                    outer: None,
                    inner: bin,
                })
                .collect(),
            Variable::TwoD { inner, outer, .. } => {
                let mut cells = Vec::with_capacity(inner.len() * outer.len());
                for outer_bin in outer.bins() {
                    let outer_selection = outer.predicate(&outer_bin);
                    for inner_bin in inner.bins() {
                        cells.push(BinCell {
                            selection: inner.predicate(&inner_bin).and(&outer_selection),
                            outer: Some(outer_bin.clone()),
                            inner: inner_bin,
                        });
                    }
                }
                cells
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinCell {
    pub outer: Option<Bin>,
    pub inner: Bin,
    pub selection: Selection,
}

impl BinCell {
    /// `outer/inner` for 2D cells, the plain bin label otherwise.
    pub fn path(&self) -> String {
        match &self.outer {
            Some(outer) => format!("{}/{}", outer.label, self.inner.label),
            None => self.inner.label.clone(),
        }
    }

    pub fn histogram_name(&self, role: &str) -> String {
        format!("bin{} {role}", self.inner.index)
    }

    /// Directory of this cell's histograms inside the output archive.
    pub fn archive_dir(&self, variable: &str) -> String {
        match &self.outer {
            Some(outer) => format!("{variable}/{}/bin{}", outer.label, self.inner.index),
            None => format!("{variable}/bin{}", self.inner.index),
        }
    }
}
