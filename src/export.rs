//! Writers for encoded batches.
//!
//! Parquet output keeps the column layout of [`EncodedColumns`] (list columns
//! for the per-token arrays) and is what a training loader should consume.
//! JSONL output writes one row per line for inspection.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, ListBuilder, StringArray, UInt32Array, UInt32Builder, UInt8Builder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;

use crate::encoding::{BatchOutput, EncodedColumns};
use crate::error::ExportError;
use crate::tokenizer::TokenId;

/// Output format for encoded batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Jsonl,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "_id")]
    id: &'a str,
    input_ids: &'a [TokenId],
    code_mask: &'a [u8],
    docstr_mask: &'a [u8],
    special_tokens_mask: &'a [u8],
    prefix_lm_token_idx: usize,
    length: usize,
}

/// Writes `output` in the requested format.
pub fn write_batch(path: &Path, output: &BatchOutput, format: ExportFormat) -> Result<(), ExportError> {
    match format {
        ExportFormat::Parquet => write_columns_parquet(path, output),
        ExportFormat::Jsonl => write_columns_jsonl(path, output),
    }
}

/// One JSON object per emitted row.
pub fn write_columns_jsonl(path: &Path, output: &BatchOutput) -> Result<(), ExportError> {
    create_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    let cols = &output.columns;

    for (i, id) in output.ids.iter().enumerate() {
        let row = ExportRow {
            id,
            input_ids: &cols.input_ids[i],
            code_mask: &cols.code_mask[i],
            docstr_mask: &cols.docstr_mask[i],
            special_tokens_mask: &cols.special_tokens_mask[i],
            prefix_lm_token_idx: cols.prefix_lm_token_idx[i],
            length: cols.length[i],
        };
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = output.rows(), "JSONL file written");
    Ok(())
}

/// Converts an encoded batch into an Arrow record batch.
pub fn to_record_batch(output: &BatchOutput) -> Result<RecordBatch, ExportError> {
    let cols = &output.columns;

    let ids: ArrayRef = Arc::new(StringArray::from_iter_values(output.ids.iter()));
    let input_ids: ArrayRef = Arc::new(token_list(&cols.input_ids));
    let code_mask: ArrayRef = Arc::new(mask_list(&cols.code_mask));
    let docstr_mask: ArrayRef = Arc::new(mask_list(&cols.docstr_mask));
    let special_tokens_mask: ArrayRef = Arc::new(mask_list(&cols.special_tokens_mask));
    let prefix: ArrayRef = Arc::new(UInt32Array::from_iter_values(
        cols.prefix_lm_token_idx.iter().map(|&v| v as u32),
    ));
    let length: ArrayRef = Arc::new(UInt32Array::from_iter_values(
        cols.length.iter().map(|&v| v as u32),
    ));

    let batch = RecordBatch::try_from_iter(vec![
        ("_id", ids),
        ("input_ids", input_ids),
        ("code_mask", code_mask),
        ("docstr_mask", docstr_mask),
        ("special_tokens_mask", special_tokens_mask),
        ("prefix_lm_token_idx", prefix),
        ("length", length),
    ])?;
    Ok(batch)
}

/// Writes the batch as a ZSTD-compressed Parquet file.
///
/// A batch with no rows still produces a file with the full schema.
pub fn write_columns_parquet(path: &Path, output: &BatchOutput) -> Result<(), ExportError> {
    let batch = to_record_batch(output)?;
    create_parent(path)?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    tracing::info!(path = %path.display(), rows = output.rows(), "Parquet file written");
    Ok(())
}

fn token_list(rows: &[Vec<TokenId>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(UInt32Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn mask_list(rows: &[Vec<u8>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(UInt8Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn create_parent(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Summary of an [`EncodedColumns`] set, for logs and CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub rows: usize,
    pub total_tokens: usize,
    pub max_length: usize,
    pub mean_length: f64,
}

impl ColumnSummary {
    pub fn from_columns(cols: &EncodedColumns) -> Self {
        let rows = cols.len();
        let total_tokens: usize = cols.length.iter().sum();
        Self {
            rows,
            total_tokens,
            max_length: cols.length.iter().copied().max().unwrap_or(0),
            mean_length: if rows == 0 {
                0.0
            } else {
                total_tokens as f64 / rows as f64
            },
        }
    }
}
