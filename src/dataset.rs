use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::cutter::cuts::Selection;
use crate::error::{EffError, Result};

/// The event table, loaded once and shared read-only by every bin.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub frame: DataFrame,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading {}", path.display());

        let file = File::open(path)?;
        let dataset = Self::from_frame(ParquetReader::new(file).finish()?);

        log::info!(
            "Loaded {} events with {} columns",
            dataset.height(),
            dataset.frame.width()
        );

        Ok(dataset)
    }

    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names_owned()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn require_columns(&self, columns: &[String]) -> Result<()> {
        let available = self.column_names();
        match columns.iter().find(|c| !available.contains(c)) {
            Some(missing) => Err(EffError::MissingColumn(missing.clone())),
            None => Ok(()),
        }
    }

    /// Values of `column` for the events passing `selection`. Nulls are dropped.
    pub fn select(&self, selection: &Selection, column: &str) -> Result<Vec<f64>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(selection.to_expr())
            .select([col(column).cast(DataType::Float64)])
            .collect()?;

        let values = df.column(column)?.f64()?;
        Ok(values.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_frame(
            df!(
                "ds_mass" => [1.90, 1.97, 1.87, 2.05],
                "ds_pt" => [9.0, 20.0, 50.0, 12.0],
                "flag" => [1i32, 0, 1, 1]
            )
            .unwrap(),
        )
    }

    #[test]
    fn select_returns_passing_values_in_order() {
        let data = dataset();
        let selection = Selection::parse("flag & ds_pt < 40").unwrap();
        assert_eq!(data.select(&selection, "ds_mass").unwrap(), vec![1.90, 2.05]);
        assert_eq!(data.select(&Selection::all(), "ds_mass").unwrap().len(), 4);
    }

    #[test]
    fn integer_columns_are_read_as_floats() {
        let data = dataset();
        let values = data.select(&Selection::parse("!flag").unwrap(), "flag").unwrap();
        assert_eq!(values, vec![0.0]);
    }

    #[test]
    fn missing_columns_are_reported_by_name() {
        let data = dataset();
        assert!(data.require_columns(&["ds_pt".to_owned()]).is_ok());
        match data.require_columns(&["ds_pt".to_owned(), "sv_prob".to_owned()]) {
            Err(EffError::MissingColumn(name)) => assert_eq!(name, "sv_prob"),
            other => panic!("expected a missing column, got {other:?}"),
        }
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = Dataset::load(Path::new("does/not/exist.parquet"));
        assert!(matches!(result, Err(EffError::File(_))));
    }
}
