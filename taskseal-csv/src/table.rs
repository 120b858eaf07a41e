//! In-memory CSV tables and atomic CSV writes.

use crate::error::{CodecError, CodecResult};
use std::path::Path;

/// A parsed CSV file: trimmed header names plus rows in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds a column by name, ignoring case and surrounding whitespace.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    /// Returns the cell at `row` in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// Resolves a column that must appear exactly once.
    pub(crate) fn require_column(&self, name: &str) -> CodecResult<usize> {
        self.unique_column(name)?
            .ok_or_else(|| CodecError::Schema(format!("missing required column '{name}'")))
    }

    /// Resolves a column that may be absent but must not be duplicated.
    pub(crate) fn unique_column(&self, name: &str) -> CodecResult<Option<usize>> {
        let mut matches = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim().eq_ignore_ascii_case(name))
            .map(|(i, _)| i);
        let first = matches.next();
        if matches.next().is_some() {
            return Err(CodecError::Schema(format!("duplicate column '{name}'")));
        }
        Ok(first)
    }
}

/// Reads any CSV file into a table.
///
/// Header names are trimmed; cell values are kept verbatim. Rows may have
/// a different width than the header here; schema checks happen later
/// so they can report the offending row.
pub fn parse_csv(path: impl AsRef<Path>) -> CodecResult<CsvTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CodecError::Schema(format!(
            "no column names found in {}",
            path.display()
        )));
    }

    let mut table = CsvTable::new(headers);
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Writes a table next to `path` and renames it into place.
///
/// The destination is only touched once every row has been written and
/// synced; on any error the temporary file is discarded.
pub(crate) fn write_csv(path: &Path, table: &CsvTable) -> CodecResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut writer = csv::Writer::from_writer(tmp);
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }

    let tmp = writer
        .into_inner()
        .map_err(|e| CodecError::Io(e.into_error()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CodecError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CsvTable {
        let mut table = CsvTable::new([" Name ", "TYPE", "content"]);
        table.push_row(vec!["a".into(), "t".into(), "x".into()]);
        table
    }

    #[test]
    fn column_lookup_ignores_case_and_whitespace() {
        let table = table();
        assert_eq!(table.column_index("name"), Some(0));
        assert_eq!(table.column_index("type"), Some(1));
        assert_eq!(table.value(0, "content"), Some("x"));
        assert_eq!(table.value(1, "content"), None);
        assert_eq!(table.value(0, "missing"), None);
    }

    #[test]
    fn duplicate_column_is_schema_error() {
        let table = CsvTable::new(["name", "type", "NAME"]);
        let err = table.require_column("name").unwrap_err();
        assert_eq!(err.to_string(), "schema error: duplicate column 'name'");
    }

    #[test]
    fn missing_column_is_schema_error() {
        let table = CsvTable::new(["type"]);
        let err = table.require_column("name").unwrap_err();
        assert_eq!(err.to_string(), "schema error: missing required column 'name'");
        assert_eq!(table.unique_column("content").unwrap(), None);
    }

    #[test]
    fn write_then_parse_preserves_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut table = CsvTable::new(["name", "content"]);
        table.push_row(vec!["a,b".into(), "line1\nline2 \"quoted\"".into()]);
        table.push_row(vec!["  padded  ".into(), String::new()]);

        write_csv(&path, &table).unwrap();
        assert_eq!(parse_csv(&path).unwrap(), table);
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "name,type,content\n").unwrap();
        let table = parse_csv(&path).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers(), ["name", "type", "content"]);
    }

    #[test]
    fn empty_file_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.csv");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(parse_csv(&path), Err(CodecError::Schema(_))));
    }
}
