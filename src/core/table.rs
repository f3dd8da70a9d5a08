//! Delimited text reading.
//!
//! Rows come back as plain string fields; headers, column counts and typing
//! are left to the caller.

use crate::domain::ports::Storage;
use crate::utils::error::{BuildError, Result};
use csv::ByteRecord;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(
        rename = "latin-1",
        alias = "latin1",
        alias = "iso-8859-1",
        alias = "ISO-8859-1"
    )]
    Latin1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    pub delimiter: u8,
    pub quoting: bool,
    pub encoding: Encoding,
}

impl TableFormat {
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            quoting: true,
            encoding: Encoding::Utf8,
        }
    }

    /// Tab separated, no quoting: the medicaments.gouv.fr registry layout.
    pub fn tsv() -> Self {
        Self::new(b'\t').without_quoting()
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn without_quoting(mut self) -> Self {
        self.quoting = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based physical line number.
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Rows of one file, tagged with where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub source: String,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(source: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            source: source.into(),
            rows,
        }
    }
}

fn decode_field<'a>(file: &str, line: u64, bytes: &'a [u8], encoding: Encoding) -> Result<Cow<'a, str>> {
    match encoding {
        Encoding::Utf8 => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|e| BuildError::parse(file, line, format!("invalid UTF-8: {}", e))),
        // Latin-1 code points map one to one onto the first 256 chars.
        Encoding::Latin1 => Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
    }
}

fn csv_error(file: &str, e: csv::Error) -> BuildError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(source) => BuildError::io(file, source),
        _ => BuildError::parse(file, line, message),
    }
}

/// One record as read from the file. Fields are decoded on access, so a
/// caller only pays for the columns it looks at.
pub struct RecordView<'a> {
    file: &'a str,
    line: u64,
    record: &'a ByteRecord,
    encoding: Encoding,
}

impl<'a> RecordView<'a> {
    pub fn new(file: &'a str, line: u64, record: &'a ByteRecord, encoding: Encoding) -> Self {
        Self {
            file,
            line,
            record,
            encoding,
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn field(&self, index: usize) -> Result<Option<Cow<'a, str>>> {
        self.record
            .get(index)
            .map(|bytes| decode_field(self.file, self.line, bytes, self.encoding))
            .transpose()
    }

    /// Parse error pointing at this record.
    pub fn error(&self, message: impl Into<String>) -> BuildError {
        BuildError::parse(self.file, self.line, message)
    }

    pub fn to_row(&self) -> Result<Row> {
        let fields = self
            .record
            .iter()
            .map(|bytes| decode_field(self.file, self.line, bytes, self.encoding).map(Cow::into_owned))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row {
            line: self.line,
            fields,
        })
    }
}

/// Streams every record of `reader` through `visit` and returns how many were
/// visited. Empty lines are skipped; whitespace-only lines are not.
pub fn scan_rows<R, F>(file: &str, reader: R, format: &TableFormat, mut visit: F) -> Result<u64>
where
    R: Read,
    F: FnMut(&RecordView<'_>) -> Result<()>,
{
    let mut reader = BufReader::new(reader);
    if format.encoding == Encoding::Utf8 {
        let has_bom = reader
            .fill_buf()
            .map_err(|e| BuildError::io(file, e))?
            .starts_with(UTF8_BOM);
        if has_bom {
            reader.consume(UTF8_BOM.len());
        }
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(format.delimiter)
        .quoting(format.quoting)
        .from_reader(reader);

    let mut record = ByteRecord::new();
    let mut visited = 0u64;
    while csv_reader
        .read_byte_record(&mut record)
        .map_err(|e| csv_error(file, e))?
    {
        if record.is_empty() || (record.len() == 1 && record[0].is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        visit(&RecordView::new(file, line, &record, format.encoding))?;
        visited += 1;
    }
    Ok(visited)
}

/// Parses a whole buffer into owned rows.
pub fn parse_rows(file: &str, bytes: &[u8], format: &TableFormat) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    scan_rows(file, bytes, format, |record| {
        rows.push(record.to_row()?);
        Ok(())
    })?;

    tracing::debug!("Read {} rows from {}", rows.len(), file);
    Ok(rows)
}

/// Reads `path` through `storage` and parses it on a blocking worker. Meant for
/// the registry tables and the allow-list; extracts go through [`scan_rows`].
pub async fn read_table<S: Storage>(storage: &S, path: &str, format: TableFormat) -> Result<Table> {
    let bytes = storage.read_file(path).await?;
    let source = path.to_string();
    tokio::task::spawn_blocking(move || -> Result<Table> {
        let rows = parse_rows(&source, &bytes, &format)?;
        Ok(Table::new(source, rows))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tab_separated_rows() {
        let data = b"111\tFOO\t1\n222\tBAR\t2\n";
        let rows = parse_rows("t.txt", data, &TableFormat::tsv()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields, vec!["111", "FOO", "1"]);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[1].field(1), Some("BAR"));
        assert_eq!(rows[1].field(3), None);
    }

    #[test]
    fn test_rows_keep_their_own_width() {
        let data = b"a;b;c\nd\ne;f\n";
        let rows = parse_rows("t.csv", data, &TableFormat::new(b';')).unwrap();
        let widths: Vec<usize> = rows.iter().map(Row::len).collect();
        assert_eq!(widths, vec![3, 1, 2]);
    }

    #[test]
    fn test_only_empty_lines_are_skipped() {
        let data = b"a;b\n\n;\nc;d\n";
        let rows = parse_rows("t.csv", data, &TableFormat::new(b';')).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].fields, vec!["", ""]);
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[2].line, 4);
    }

    #[test]
    fn test_whitespace_only_line_reaches_the_caller() {
        let data = b"111\tFOO\n\t \t\n";
        let rows = parse_rows("t.txt", data, &TableFormat::tsv()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["", " ", ""]);
    }

    #[test]
    fn test_scan_rows_decodes_only_requested_fields() {
        let data = b"CIP13;libelle;BOITES\n100;parac\xE9tamol;3\n200;ibuprof\xE8ne;4\n";
        let format = TableFormat::new(b';');

        let mut boxes = Vec::new();
        let visited = scan_rows("m.csv", &data[..], &format, |record| {
            if record.line() > 1 {
                let field = record.field(2)?.unwrap_or_default();
                boxes.push(field.parse::<u64>().map_err(|e| record.error(e.to_string()))?);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(visited, 3);
        assert_eq!(boxes, vec![3, 4]);
    }

    #[test]
    fn test_scan_rows_stops_at_first_visitor_error() {
        let data = b"1\n2\n3\n";
        let mut seen = 0;
        let result = scan_rows("t.csv", &data[..], &TableFormat::new(b';'), |record| {
            seen += 1;
            if record.line() == 2 {
                return Err(record.error("bad row"));
            }
            Ok(())
        });

        assert!(matches!(result, Err(BuildError::ParseError { line: 2, .. })));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_quotes_are_literal_without_quoting() {
        let data = b"1\tCOMPRIME \"SECABLE\"\t3\n";
        let rows = parse_rows("t.txt", data, &TableFormat::tsv()).unwrap();
        assert_eq!(rows[0].field(1), Some("COMPRIME \"SECABLE\""));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let data = b"\xEF\xBB\xBFparac\xC3\xA9tamol\n";
        let rows = parse_rows("l.csv", data, &TableFormat::new(b';')).unwrap();
        assert_eq!(rows[0].field(0), Some("paracétamol"));
    }

    #[test]
    fn test_latin1_decoding() {
        let data = b"parac\xE9tamol;1\n";
        let format = TableFormat::new(b';').with_encoding(Encoding::Latin1);
        let rows = parse_rows("m.csv", data, &format).unwrap();
        assert_eq!(rows[0].field(0), Some("paracétamol"));
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let data = b"ok\nparac\xE9tamol\n";
        let err = parse_rows("m.csv", data, &TableFormat::new(b';')).unwrap_err();
        match err {
            BuildError::ParseError { file, line, .. } => {
                assert_eq!(file, "m.csv");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
