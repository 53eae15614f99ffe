use std::fmt::Display;

use polars::prelude::*;
use regex::Regex;

use crate::error::{EffError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Greater),
            "<" => Some(Self::Less),
            ">=" => Some(Self::GreaterEqual),
            "<=" => Some(Self::LessEqual),
            "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

/// One term of a conjunction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Condition {
    Compare {
        column: String,
        abs: bool,
        operator: Operator,
        value: f64,
    },
    Flag {
        column: String,
        negated: bool,
    },
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Compare { column, .. } | Condition::Flag { column, .. } => column,
        }
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            Condition::Compare {
                column,
                abs,
                operator,
                value,
            } => {
                let lhs = if *abs {
                    col(column.as_str()).abs()
                } else {
                    col(column.as_str())
                };
                let rhs = lit(*value);
                match operator {
                    Operator::Greater => lhs.gt(rhs),
                    Operator::Less => lhs.lt(rhs),
                    Operator::GreaterEqual => lhs.gt_eq(rhs),
                    Operator::LessEqual => lhs.lt_eq(rhs),
                    Operator::Equal => lhs.eq(rhs),
                    Operator::NotEqual => lhs.neq(rhs),
                }
            }
            Condition::Flag { column, negated } => {
                let flag = col(column.as_str()).cast(DataType::Boolean);
                if *negated { flag.not() } else { flag }
            }
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Compare {
                column,
                abs: true,
                operator,
                value,
            } => write!(f, "abs({column}) {} {value}", operator.as_str()),
            Condition::Compare {
                column,
                abs: false,
                operator,
                value,
            } => write!(f, "{column} {} {value}", operator.as_str()),
            Condition::Flag {
                column,
                negated: true,
            } => write!(f, "!{column}"),
            Condition::Flag {
                column,
                negated: false,
            } => write!(f, "{column}"),
        }
    }
}

/// A conjunction of conditions over event columns, e.g.
/// `ds_hasphi & sv_prob>0.1 & abs(ds_eta) <= 1.5`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Selection {
    pub conditions: Vec<Condition>,
}

impl Selection {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// Accepts every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn parse(expression: &str) -> Result<Self> {
        let compare_re = Regex::new(
            r"^(?:abs\(\s*(?P<abs_column>\w+)\s*\)|(?P<column>\w+))\s*(?P<op>>=|<=|!=|==|>|<)\s*(?P<value>[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?|nan|inf|-inf)$",
        )
        .map_err(|e| EffError::Selection(e.to_string()))?;
        let flag_re = Regex::new(r"^(?P<negated>!)?\s*(?P<column>[A-Za-z_]\w*)$")
            .map_err(|e| EffError::Selection(e.to_string()))?;

        let mut conditions = Vec::new();

        // '&&' splits into an empty term which is skipped
        for term in expression.split('&') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }

            if let Some(caps) = compare_re.captures(term) {
                let (column, abs) = match caps.name("abs_column") {
                    Some(column) => (column.as_str(), true),
                    None => (&caps["column"], false),
                };
                let operator = Operator::parse(&caps["op"]).ok_or_else(|| {
                    EffError::Selection(format!("unknown operator in '{term}'"))
                })?;
                let value: f64 = caps["value"].parse().map_err(|e| {
                    EffError::Selection(format!("invalid numeric literal in '{term}': {e}"))
                })?;

                conditions.push(Condition::Compare {
                    column: column.to_owned(),
                    abs,
                    operator,
                    value,
                });
            } else if let Some(caps) = flag_re.captures(term) {
                conditions.push(Condition::Flag {
                    column: caps["column"].to_owned(),
                    negated: caps.name("negated").is_some(),
                });
            } else {
                return Err(EffError::Selection(format!(
                    "could not parse '{term}' in '{expression}'"
                )));
            }
        }

        Ok(Self { conditions })
    }

    /// `lower <= |column| <= upper`, both edges included.
    pub fn abs_within(column: &str, lower: f64, upper: f64) -> Self {
        Self::new(vec![
            Condition::Compare {
                column: column.to_owned(),
                abs: true,
                operator: Operator::GreaterEqual,
                value: lower,
            },
            Condition::Compare {
                column: column.to_owned(),
                abs: true,
                operator: Operator::LessEqual,
                value: upper,
            },
        ])
    }

    pub fn and(&self, other: &Selection) -> Selection {
        let mut conditions = self.conditions.clone();
        conditions.extend(other.conditions.iter().cloned());
        Selection { conditions }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn to_expr(&self) -> Expr {
        self.conditions
            .iter()
            .map(Condition::to_expr)
            .reduce(|a, b| a.and(b))
            .unwrap_or_else(|| lit(true))
    }

    /// Returns the column(s) required by the selection, without duplicates.
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for condition in &self.conditions {
            if !columns.iter().any(|c| c == condition.column()) {
                columns.push(condition.column().to_owned());
            }
        }
        columns
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(" & "))
    }
}
