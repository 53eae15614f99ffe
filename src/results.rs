use std::fs::File;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;

use crate::binning::BinCell;
use crate::efficiency::EfficiencyRecord;
use crate::error::Result;

/// Per variable results: bin label to record, or outer label to inner label to
/// record for 2D variables.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum VariableResult {
    OneD(IndexMap<String, EfficiencyRecord>),
    TwoD(IndexMap<String, IndexMap<String, EfficiencyRecord>>),
}

/// Insertion ordered `variable -> bins` tree, serialized once at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ResultTree {
    pub variables: IndexMap<String, VariableResult>,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a variable so it appears in the output even if every bin fails.
    pub fn add_variable(&mut self, name: &str, two_dimensional: bool) {
        self.variables.entry(name.to_owned()).or_insert_with(|| {
            if two_dimensional {
                VariableResult::TwoD(IndexMap::new())
            } else {
                VariableResult::OneD(IndexMap::new())
            }
        });
    }

    /// Registers the outer bin of a 2D variable.
    pub fn ensure_parent(&mut self, variable: &str, outer_label: &str) {
        self.add_variable(variable, true);
        if let Some(VariableResult::TwoD(outer)) = self.variables.get_mut(variable) {
            outer.entry(outer_label.to_owned()).or_default();
        }
    }

    pub fn insert(&mut self, variable: &str, cell: &BinCell, record: EfficiencyRecord) {
        match &cell.outer {
            Some(outer_bin) => {
                self.ensure_parent(variable, &outer_bin.label);
                if let Some(VariableResult::TwoD(outer)) = self.variables.get_mut(variable)
                    && let Some(inner) = outer.get_mut(&outer_bin.label)
                {
                    inner.insert(cell.inner.label.clone(), record);
                }
            }
            None => {
                self.add_variable(variable, false);
                if let Some(VariableResult::OneD(bins)) = self.variables.get_mut(variable) {
                    bins.insert(cell.inner.label.clone(), record);
                }
            }
        }
    }

    /// Pretty JSON with four space indentation.
    pub fn to_json_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json_string()?.as_bytes())?;
        log::info!("Wrote efficiencies to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{Axis, Variable};

    fn record(value: f64) -> EfficiencyRecord {
        EfficiencyRecord {
            value,
            error: 0.01,
            quality: None,
        }
    }

    #[test]
    fn one_dimensional_keys_keep_bin_order() {
        let variable = Variable::OneD {
            name: "pt".to_owned(),
            axis: Axis::new("ds_pt", &[8.0, 15.0, 35.0, 1000.0]),
        };
        let mut tree = ResultTree::new();
        let cells = variable.cells();
        for cell in &cells {
            tree.insert("pt", cell, record(0.5));
        }

        let json = tree.to_json_string().unwrap();
        let a = json.find("\"8,15\"").unwrap();
        let b = json.find("\"15,35\"").unwrap();
        let c = json.find("\"35,1000\"").unwrap();
        assert!(a < b && b < c, "{json}");
        assert!(json.contains("\n    \"pt\": {\n        \"8,15\": {"), "{json}");
    }

    #[test]
    fn two_dimensional_results_nest_under_the_outer_bin() {
        let variable = Variable::TwoD {
            name: "pt_eta".to_owned(),
            inner: Axis::new("ds_pt", &[8.0, 15.0, 35.0]),
            outer: Axis::new("ds_eta", &[0.0, 0.7, 1.5]),
        };
        let mut tree = ResultTree::new();
        tree.add_variable("pt", false);
        for (i, cell) in variable.cells().iter().enumerate() {
            tree.insert("pt_eta", cell, record(i as f64));
        }

        let value: serde_json::Value = serde_json::from_str(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(value["pt"], serde_json::json!({}));
        assert_eq!(value["pt_eta"]["0.7,1.5"]["15,35"]["value"], 3.0);
        assert_eq!(value["pt_eta"]["0.0,0.7"]["8,15"]["error"], 0.01);

        let keys: Vec<&String> = tree.variables.keys().collect();
        assert_eq!(keys, vec!["pt", "pt_eta"]);
        let Some(VariableResult::TwoD(outer)) = tree.variables.get("pt_eta") else {
            panic!("pt_eta should be two dimensional");
        };
        assert_eq!(outer["0.0,0.7"]["15,35"].value, 1.0);
    }

    #[test]
    fn written_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eff_from_ds.json");

        let variable = Variable::OneD {
            name: "eta".to_owned(),
            axis: Axis::new("ds_eta", &[0.0, 0.7, 1.5]),
        };
        let mut tree = ResultTree::new();
        for cell in variable.cells() {
            tree.insert("eta", &cell, record(0.9));
        }
        tree.write_json(&path).unwrap();

        let read: ResultTree =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, tree);
    }
}
