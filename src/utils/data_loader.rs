//! CSV loading into [`FeatureMatrix`]

use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Column names of the preprocessed loan dataset, label last
pub const LOAN_FEATURE_COLUMNS: [&str; 5] = [
    "Income",
    "Credit_Score",
    "Loan_Amount",
    "DTI_Ratio",
    "Employment_Status",
];
pub const LOAN_LABEL_COLUMN: &str = "Approval";

/// Position of the label column in the raw loading path
pub const RAW_LABEL_INDEX: usize = 5;

/// Data loader for header-carrying CSV files
pub struct DataLoader {
    /// Rows used to infer the schema
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file into a DataFrame
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)?;

        let reader = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file);

        reader.finish().map_err(|e| EnsembleError::DataError(e.to_string()))
    }

    /// Raw path: the column at [`RAW_LABEL_INDEX`] is the label, every other column a feature
    pub fn load_raw(&self, path: &Path) -> Result<FeatureMatrix> {
        let start = Instant::now();
        let df = self.load_csv(path)?;
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        if names.len() <= RAW_LABEL_INDEX {
            return Err(EnsembleError::FeatureNotFound(format!(
                "label column {} (file has {} columns)",
                RAW_LABEL_INDEX + 1,
                names.len()
            )));
        }

        let label_col = names[RAW_LABEL_INDEX].clone();
        let feature_cols: Vec<String> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != RAW_LABEL_INDEX)
            .map(|(_, name)| name.clone())
            .collect();

        let matrix = frame_to_matrix(&df, &feature_cols, &label_col)?;
        info!(
            path = %path.display(),
            n_samples = matrix.n_samples(),
            n_features = matrix.n_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(matrix)
    }

    /// Named path: requires the loan feature columns plus the `Approval` label
    pub fn load_loan_dataset(&self, path: &Path) -> Result<FeatureMatrix> {
        let df = self.load_csv(path)?;
        let feature_cols: Vec<String> = LOAN_FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect();
        frame_to_matrix(&df, &feature_cols, LOAN_LABEL_COLUMN)
    }
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| EnsembleError::FeatureNotFound(name.to_string()))?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|e| EnsembleError::DataError(e.to_string()))?;
    let series = casted.as_materialized_series();
    let values = series
        .f64()
        .map_err(|e| EnsembleError::DataError(e.to_string()))?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                EnsembleError::DataError(format!("missing value in column {} at row {}", name, row))
            })
        })
        .collect()
}

/// Extract named columns into a row-major feature matrix
fn frame_to_matrix(df: &DataFrame, feature_cols: &[String], label_col: &str) -> Result<FeatureMatrix> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = feature_cols
        .iter()
        .map(|name| column_values(df, name))
        .collect::<Result<_>>()?;

    let labels: Array1<i32> = column_values(df, label_col)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            if v == 0.0 || v == 1.0 {
                Ok(v as i32)
            } else {
                Err(EnsembleError::DataError(format!(
                    "label {} at row {} in column {} is not 0 or 1",
                    v, row, label_col
                )))
            }
        })
        .collect::<Result<_>>()?;

    let features = Array2::from_shape_fn((n_rows, feature_cols.len()), |(r, c)| col_data[c][r] as f32);
    FeatureMatrix::new(features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const CSV: &str = "Income,Credit_Score,Loan_Amount,DTI_Ratio,Employment_Status,Approval\n\
                       0.5,-1.2,0.3,0.1,1,1\n\
                       -0.7,0.4,1.1,-0.2,0,0\n\
                       1.3,0.9,-0.5,0.6,1,1\n";

    #[test]
    fn test_load_raw_uses_sixth_column_as_label() {
        let file = write_csv(CSV);
        let m = DataLoader::new().load_raw(file.path()).unwrap();
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.n_features(), 5);
        assert_eq!(m.labels().to_vec(), vec![1, 0, 1]);
        assert_eq!(m.value(1, 0), -0.7);
        assert_eq!(m.value(2, 4), 1.0);
    }

    #[test]
    fn test_load_loan_dataset_requires_columns() {
        let file = write_csv("Income,Credit_Score,Approval\n1,2,0\n");
        let err = DataLoader::new().load_loan_dataset(file.path()).unwrap_err();
        assert!(matches!(err, EnsembleError::FeatureNotFound(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_loan_dataset_by_name() {
        let file = write_csv(CSV);
        let m = DataLoader::new().load_loan_dataset(file.path()).unwrap();
        assert_eq!(m.n_features(), 5);
        assert_eq!(m.value(0, 1), -1.2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DataLoader::new()
            .load_raw(Path::new("/nonexistent/data.csv"))
            .unwrap_err();
        assert!(matches!(err, EnsembleError::IoError(_)));
    }

    #[test]
    fn test_fractional_label_rejected() {
        let file = write_csv("a,b,c,d,e,Approval\n0.1,0.2,0.3,0.4,1,1\n0.5,0.6,0.7,0.8,0,0.4\n");
        let err = DataLoader::new().load_raw(file.path()).unwrap_err();
        assert!(matches!(err, EnsembleError::DataError(_)));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_nan_feature_rejected() {
        let file = write_csv("a,b,c,d,e,Approval\n0.1,0.2,0.3,0.4,1,1\n0.5,NaN,0.7,0.8,0,0\n");
        let err = DataLoader::new().load_raw(file.path()).unwrap_err();
        assert!(matches!(err, EnsembleError::DataError(_)));
    }
}
