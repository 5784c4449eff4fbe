use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use super::RasterError;

// ---------------------------------------------------------------------------
// Column-oriented table for CSV / Parquet export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Parquet => "parquet",
        }
    }
}

/// A typed column. Missing floats are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(String, Vec<i64>),
    Float(String, Vec<f64>),
    Text(String, Vec<String>),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Int(n, _) | Column::Float(n, _) | Column::Text(n, _) => n,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int(_, v) => v.len(),
            Column::Float(_, v) => v.len(),
            Column::Text(_, v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Column::Int(_, v) => v[row].to_string(),
            Column::Float(_, v) if v[row].is_nan() => String::new(),
            Column::Float(_, v) => v[row].to_string(),
            Column::Text(_, v) => v[row].clone(),
        }
    }

    fn to_arrow(&self) -> (Field, ArrayRef) {
        match self {
            Column::Int(n, v) => (
                Field::new(n, DataType::Int64, false),
                Arc::new(Int64Array::from(v.clone())) as ArrayRef,
            ),
            Column::Float(n, v) => (
                Field::new(n, DataType::Float64, true),
                Arc::new(Float64Array::from(
                    v.iter()
                        .map(|x| if x.is_nan() { None } else { Some(*x) })
                        .collect::<Vec<_>>(),
                )) as ArrayRef,
            ),
            Column::Text(n, v) => (
                Field::new(n, DataType::Utf8, false),
                Arc::new(StringArray::from(
                    v.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )) as ArrayRef,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    fn check_lengths(&self) -> Result<(), RasterError> {
        let n = self.nrows();
        match self.columns.iter().find(|c| c.len() != n) {
            Some(c) => Err(RasterError::Misaligned {
                what: format!("table column '{}'", c.name()),
                detail: format!("{} rows, expected {n}", c.len()),
            }),
            None => Ok(()),
        }
    }

    /// Write to `path` in the given format.
    pub fn write(&self, path: &Path, format: TableFormat) -> Result<(), RasterError> {
        self.check_lengths()?;
        match format {
            TableFormat::Csv => self.write_csv(path),
            TableFormat::Parquet => self.write_parquet(path),
        }
    }

    fn write_csv(&self, path: &Path) -> Result<(), RasterError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.columns.iter().map(Column::name))?;
        for row in 0..self.nrows() {
            writer.write_record(self.columns.iter().map(|c| c.cell(row)))?;
        }
        writer.flush().map_err(|e| RasterError::io(path, e))?;
        Ok(())
    }

    fn write_parquet(&self, path: &Path) -> Result<(), RasterError> {
        let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) =
            self.columns.iter().map(Column::to_arrow).unzip();
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;

        let file = std::fs::File::create(path).map_err(|e| RasterError::io(path, e))?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn sample() -> Table {
        Table::new(vec![
            Column::Int("zone".into(), vec![1, 2]),
            Column::Text("date".into(), vec!["2005-05-09".into(), "2005-05-25".into()]),
            Column::Float("mean".into(), vec![0.61, f64::NAN]),
        ])
    }

    #[test]
    fn csv_leaves_missing_cells_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        sample().write(&path, TableFormat::Csv).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["zone,date,mean", "1,2005-05-09,0.61", "2,2005-05-25,"]);
    }

    #[test]
    fn parquet_keeps_types_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        sample().write(&path, TableFormat::Parquet).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches[0].num_rows(), 2);
        let mean = batches[0]
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!(mean.is_null(1));
        assert_eq!(mean.value(0), 0.61);
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(vec![
            Column::Int("a".into(), vec![1, 2]),
            Column::Float("b".into(), vec![0.5]),
        ]);
        assert!(table.write(&dir.path().join("x.csv"), TableFormat::Csv).is_err());
    }
}
