//! Columnar sources exposed as an ordered stream of row batches.

use crate::normalize::RawValue;
use crate::Result;
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Float64Type};
use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType;
use futures::stream::{self, BoxStream, StreamExt};
use parquet::arrow::{ParquetRecordBatchStreamBuilder, ProjectionMask};
use serde_json::{Map, Number, Value};
use std::path::Path;
use tokio::fs::File;

pub type RowBatchStream = BoxStream<'static, Result<RowBatch>>;

/// Producer of fixed-size row batches in source order.
pub trait BatchSource {
    /// Every column present in the source, before projection.
    fn column_names(&self) -> Vec<String>;

    /// Stream batches holding only `columns` (unknown names are ignored).
    fn into_batches(self, columns: &[String], batch_size: usize) -> Result<RowBatchStream>;
}

/// Rows of raw cells aligned to a shared column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RowBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<RawValue>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        self.rows.push(cells);
    }

    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
        let mut out = RowBatch::new(columns);
        out.rows.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| cell_at(col.as_ref(), row))
                .collect::<Result<Vec<_>>>()?;
            out.rows.push(cells);
        }
        Ok(out)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.rows.iter().map(|cells| RawRow {
            columns: &self.columns,
            cells,
        })
    }
}

/// Borrowed view of one row: column name -> raw cell.
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    columns: &'a [String],
    cells: &'a [RawValue],
}

impl<'a> RawRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a RawValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.cells.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a RawValue)> {
        self.columns.iter().map(String::as_str).zip(self.cells.iter())
    }
}

/// Convert one Arrow cell. Struct cells become a JSON object string so the
/// normalizer can unwrap `{lang, text}` pairs; non-finite floats are null.
pub fn cell_at(array: &dyn Array, row: usize) -> Result<RawValue> {
    if array.is_null(row) {
        return Ok(RawValue::Null);
    }
    let value = match array.data_type() {
        DataType::Utf8 => RawValue::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => RawValue::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Utf8View => RawValue::Text(array.as_string_view().value(row).to_string()),
        DataType::List(_) => list_cells(array.as_list::<i32>().value(row).as_ref())?,
        DataType::LargeList(_) => list_cells(array.as_list::<i64>().value(row).as_ref())?,
        DataType::Struct(_) => {
            let fields = array.as_struct();
            let mut map = Map::new();
            for (name, child) in fields.column_names().into_iter().zip(fields.columns()) {
                map.insert(name.to_string(), cell_at(child.as_ref(), row)?.to_json());
            }
            RawValue::Text(serde_json::to_string(&Value::Object(map))?)
        }
        DataType::Float32 => float_cell(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => float_cell(array.as_primitive::<Float64Type>().value(row)),
        dt if dt.is_integer() => {
            let text = arrow_cast::display::array_value_to_string(array, row)?;
            match text.parse::<Number>() {
                Ok(n) => RawValue::Number(n),
                Err(_) => RawValue::Text(text),
            }
        }
        _ => RawValue::Text(arrow_cast::display::array_value_to_string(array, row)?),
    };
    Ok(value)
}

fn list_cells(values: &dyn Array) -> Result<RawValue> {
    let items = (0..values.len())
        .map(|i| cell_at(values, i))
        .collect::<Result<Vec<_>>>()?;
    Ok(RawValue::List(items))
}

fn float_cell(v: f64) -> RawValue {
    Number::from_f64(v).map_or(RawValue::Null, RawValue::Number)
}

/// Parquet file read through the async Arrow reader.
pub struct ParquetSource {
    builder: ParquetRecordBatchStreamBuilder<File>,
}

impl ParquetSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
        Ok(Self { builder })
    }

    pub fn row_count(&self) -> i64 {
        self.builder.metadata().file_metadata().num_rows()
    }
}

impl BatchSource for ParquetSource {
    fn column_names(&self) -> Vec<String> {
        self.builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    fn into_batches(self, columns: &[String], batch_size: usize) -> Result<RowBatchStream> {
        let schema = self.builder.schema().clone();
        let roots: Vec<usize> = columns
            .iter()
            .filter_map(|c| schema.index_of(c).ok())
            .collect();
        let mask = ProjectionMask::roots(self.builder.parquet_schema(), roots);
        let stream = self
            .builder
            .with_batch_size(batch_size.max(1))
            .with_projection(mask)
            .build()?;
        Ok(stream
            .map(|batch| RowBatch::from_record_batch(&batch?))
            .boxed())
    }
}

/// In-memory rows with the same batching contract as a file source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<RawValue>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        self.rows.push(cells);
    }

    pub fn with_row(mut self, cells: Vec<RawValue>) -> Self {
        self.push_row(cells);
        self
    }
}

impl BatchSource for MemorySource {
    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn into_batches(self, columns: &[String], batch_size: usize) -> Result<RowBatchStream> {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| columns.contains(c))
            .map(|(i, _)| i)
            .collect();
        let projected: Vec<String> = keep.iter().map(|&i| self.columns[i].clone()).collect();

        let mut batches = Vec::new();
        for chunk in self.rows.chunks(batch_size.max(1)) {
            let mut batch = RowBatch::new(projected.clone());
            for row in chunk {
                batch.push_row(keep.iter().map(|&i| row[i].clone()).collect());
            }
            batches.push(Ok(batch));
        }
        Ok(stream::iter(batches).boxed())
    }
}
