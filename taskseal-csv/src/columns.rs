//! Column merge/split transforms between the wide, human-authored schema
//! and the narrow schemas the row cipher consumes.
//!
//! Everything here is pure data shaping; no keys are involved.

use crate::error::{CodecError, CodecResult};
use crate::table::{parse_csv, write_csv, CsvTable};
use crate::types::{
    EncryptedRow, ResultRow, TaskRow, COLUMN_CIPHERTEXT, COLUMN_CONTENT, COLUMN_NAME,
    COLUMN_RESULT, COLUMN_SIGNATURE, COLUMN_TYPE, ENCRYPTED_HEADERS, RESULT_HEADERS, TASK_HEADERS,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// Resolved column layout of a wide task CSV.
#[derive(Debug)]
pub(crate) struct TaskColumns {
    name: usize,
    task_type: usize,
    content: Option<usize>,
    /// Payload columns other than `content`, with their header names.
    extras: Vec<(usize, String)>,
    /// Columns without a header; their cells must stay empty.
    unnamed: Vec<usize>,
    width: usize,
}

impl TaskColumns {
    pub(crate) fn resolve(table: &CsvTable) -> CodecResult<Self> {
        let name = table.require_column(COLUMN_NAME)?;
        let task_type = table.require_column(COLUMN_TYPE)?;
        let content = table.unique_column(COLUMN_CONTENT)?;

        let mut seen = HashSet::new();
        let mut extras = Vec::new();
        let mut unnamed = Vec::new();
        for (i, header) in table.headers().iter().enumerate() {
            let header = header.trim();
            if i == name || i == task_type || Some(i) == content {
                continue;
            }
            if header.is_empty() {
                unnamed.push(i);
                continue;
            }
            if !seen.insert(header.to_ascii_lowercase()) {
                return Err(CodecError::Schema(format!("duplicate column '{header}'")));
            }
            extras.push((i, header.to_string()));
        }

        Ok(Self {
            name,
            task_type,
            content,
            extras,
            unnamed,
            width: table.headers().len(),
        })
    }

    pub(crate) fn name_index(&self) -> usize {
        self.name
    }

    /// Folds one wide record into a narrow task row.
    ///
    /// Without extra payload columns `content` passes through unchanged.
    /// Otherwise every non-empty payload cell, `content` included, is
    /// folded into a JSON object keyed by header name in sorted order.
    pub(crate) fn merge_row(&self, record: &[String]) -> CodecResult<TaskRow> {
        check_width(record, self.width)?;
        let name = required_cell(record, self.name, COLUMN_NAME)?;
        let task_type = required_cell(record, self.task_type, COLUMN_TYPE)?;
        if let Some(i) = self.unnamed.iter().find(|&&i| !record[i].trim().is_empty()) {
            return Err(CodecError::Schema(format!(
                "value in column {} has no header",
                i + 1
            )));
        }
        let content_cell = self.content.map(|i| record[i].as_str()).unwrap_or_default();

        let content = if self.extras.is_empty() {
            content_cell.to_string()
        } else {
            let mut folded: BTreeMap<&str, &str> = self
                .extras
                .iter()
                .map(|(i, header)| (header.as_str(), record[*i].trim()))
                .filter(|(_, value)| !value.is_empty())
                .collect();
            if !content_cell.trim().is_empty() {
                folded.insert(COLUMN_CONTENT, content_cell.trim());
            }
            serde_json::to_string(&folded)?
        };

        Ok(TaskRow {
            name: name.to_string(),
            task_type: task_type.to_string(),
            content,
        })
    }
}

/// Resolved column layout of a plaintext result CSV.
#[derive(Debug)]
pub(crate) struct ResultColumns {
    name: usize,
    result: usize,
}

impl ResultColumns {
    pub(crate) fn resolve(table: &CsvTable) -> CodecResult<Self> {
        let columns = Self {
            name: table.require_column(COLUMN_NAME)?,
            result: table.require_column(COLUMN_RESULT)?,
        };
        reject_extra_columns(table, &RESULT_HEADERS)?;
        Ok(columns)
    }

    pub(crate) fn name_index(&self) -> usize {
        self.name
    }

    pub(crate) fn parse_row(&self, record: &[String]) -> CodecResult<ResultRow> {
        check_width(record, RESULT_HEADERS.len())?;
        let name = required_cell(record, self.name, COLUMN_NAME)?;
        let result = serde_json::from_str(&record[self.result])
            .map_err(|e| CodecError::Schema(format!("malformed result value: {e}")))?;
        Ok(ResultRow {
            name: name.to_string(),
            result,
        })
    }
}

/// Resolved column layout of an encrypted task or result CSV.
#[derive(Debug)]
pub(crate) struct EncryptedColumns {
    name: usize,
    ciphertext: usize,
    signature: usize,
}

impl EncryptedColumns {
    pub(crate) fn resolve(table: &CsvTable) -> CodecResult<Self> {
        let columns = Self {
            name: table.require_column(COLUMN_NAME)?,
            ciphertext: table.require_column(COLUMN_CIPHERTEXT)?,
            signature: table.require_column(COLUMN_SIGNATURE)?,
        };
        reject_extra_columns(table, &ENCRYPTED_HEADERS)?;
        Ok(columns)
    }

    pub(crate) fn name_index(&self) -> usize {
        self.name
    }

    pub(crate) fn parse_row(&self, record: &[String]) -> CodecResult<EncryptedRow> {
        check_width(record, ENCRYPTED_HEADERS.len())?;
        Ok(EncryptedRow {
            name: required_cell(record, self.name, COLUMN_NAME)?.to_string(),
            ciphertext: record[self.ciphertext].clone(),
            signature: record[self.signature].clone(),
        })
    }
}

/// Rejects a file in which two rows share a `name`.
///
/// `name` is the only correlation key between plaintext and encrypted
/// files, so it must identify a single row.
pub(crate) fn check_unique_names(table: &CsvTable, name_index: usize) -> CodecResult<()> {
    let mut seen = HashSet::new();
    for (i, row) in table.rows().iter().enumerate() {
        let Some(name) = row.get(name_index) else {
            continue;
        };
        if !name.is_empty() && !seen.insert(name.as_str()) {
            return Err(CodecError::Schema(format!(
                "row {}: duplicate name '{name}'",
                i + 1
            )));
        }
    }
    Ok(())
}

fn check_width(record: &[String], width: usize) -> CodecResult<()> {
    if record.len() != width {
        return Err(CodecError::Schema(format!(
            "row has {} fields, header has {width}",
            record.len()
        )));
    }
    Ok(())
}

fn required_cell<'a>(record: &'a [String], index: usize, column: &str) -> CodecResult<&'a str> {
    let value = record[index].as_str();
    if value.trim().is_empty() {
        return Err(CodecError::Schema(format!("empty '{column}' value")));
    }
    Ok(value)
}

fn reject_extra_columns(table: &CsvTable, expected: &[&str]) -> CodecResult<()> {
    match table
        .headers()
        .iter()
        .find(|h| !expected.iter().any(|e| h.trim().eq_ignore_ascii_case(e)))
    {
        Some(extra) => Err(CodecError::Schema(format!("unexpected column '{extra}'"))),
        None => Ok(()),
    }
}

/// Folds a wide task CSV into the narrow `name,type,content` schema.
///
/// Returns the number of rows written. Any malformed row aborts the
/// merge before `output` is created.
pub fn merge_csv_columns(input: impl AsRef<Path>, output: impl AsRef<Path>) -> CodecResult<usize> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let table = parse_csv(input)?;
    let columns = TaskColumns::resolve(&table)?;
    check_unique_names(&table, columns.name_index())?;

    let mut merged = CsvTable::new(TASK_HEADERS);
    for (i, record) in table.rows().iter().enumerate() {
        let row = columns
            .merge_row(record)
            .map_err(|e| e.at_row(input, i + 1))?;
        merged.push_row(row.into_record());
    }

    write_csv(output, &merged)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = merged.len(),
        "merged task columns"
    );
    Ok(merged.len())
}

/// Rewrites a `name,result` CSV with each result key in its own column.
///
/// Key columns are the sorted union of all result keys. String values
/// are written raw, everything else as compact JSON, and keys absent from
/// a row leave an empty cell. Every `result` must be a JSON object.
pub fn flatten_result_columns(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> CodecResult<usize> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let table = parse_csv(input)?;
    let columns = ResultColumns::resolve(&table)?;

    let mut rows = Vec::with_capacity(table.len());
    let mut keys = BTreeSet::new();
    for (i, record) in table.rows().iter().enumerate() {
        let row = columns.parse_row(record).map_err(|e| e.at_row(input, i + 1))?;
        let Value::Object(fields) = row.result else {
            return Err(CodecError::Schema("result is not a JSON object".to_string())
                .at_row(input, i + 1));
        };
        if fields.keys().any(|k| k.eq_ignore_ascii_case(COLUMN_NAME)) {
            return Err(CodecError::Schema(format!(
                "result key collides with the '{COLUMN_NAME}' column"
            ))
            .at_row(input, i + 1));
        }
        keys.extend(fields.keys().cloned());
        rows.push((row.name, fields));
    }

    let headers = std::iter::once(COLUMN_NAME.to_string()).chain(keys.iter().cloned());
    let mut flat = CsvTable::new(headers);
    for (name, fields) in rows {
        let mut record = Vec::with_capacity(keys.len() + 1);
        record.push(name);
        record.extend(keys.iter().map(|key| match fields.get(key) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }));
        flat.push_row(record);
    }

    write_csv(output, &flat)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = flat.len(),
        columns = keys.len(),
        "flattened result columns"
    );
    Ok(flat.len())
}
