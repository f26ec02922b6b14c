//! CSV decoding and per-cell type coercion.

use std::io::{self, Read};

use crate::error::{IngestionError, IngestionResult};
use crate::types::Value;

/// Marker that turns a row into a comment when its first cell starts with it.
pub const COMMENT_PREFIX: char = '#';

/// One data row as read from the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    /// 1-based line number where the row starts.
    pub line: u64,
    /// Raw cell values.
    pub cells: Vec<String>,
}

/// Streaming reader over a comma-delimited upload.
///
/// Rules:
///
/// - The first non-comment row is the header; the following non-comment rows are data.
/// - A row whose first cell starts with `#` is a comment and is skipped, wherever it appears.
///   Quotes inside a comment line are ignored.
/// - Rows may have a different number of cells than the header; they are returned as read.
/// - A quoted field still open at end of input is [`IngestionError::MalformedCsv`].
/// - Any other read failure (I/O, invalid UTF-8) is returned as an error.
/// - End of input is not an error.
pub struct RecordDecoder<R> {
    rdr: csv::Reader<CommentFilter<R>>,
    record: csv::StringRecord,
}

impl<R: Read> RecordDecoder<R> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(CommentFilter::new(reader));
        Self {
            rdr,
            record: csv::StringRecord::new(),
        }
    }

    /// Read the header row. An input without any non-comment row yields an empty header.
    pub fn read_headers(&mut self) -> IngestionResult<Vec<String>> {
        Ok(self.next_row()?.map(|row| row.cells).unwrap_or_default())
    }

    /// Read the next non-comment row, or `None` at end of input.
    pub fn next_row(&mut self) -> IngestionResult<Option<DecodedRow>> {
        loop {
            let more = self.rdr.read_record(&mut self.record)?;
            if let Some(line) = self.rdr.get_ref().unterminated_quote {
                return Err(IngestionError::MalformedCsv {
                    line,
                    message: "quoted field is never closed".to_string(),
                });
            }
            if !more {
                return Ok(None);
            }
            if is_comment(&self.record) {
                continue;
            }
            let line = self.record.position().map(|p| p.line()).unwrap_or_default();
            let cells = self.record.iter().map(str::to_owned).collect();
            return Ok(Some(DecodedRow { line, cells }));
        }
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = IngestionResult<DecodedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

fn is_comment(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .is_some_and(|first| first.starts_with(COMMENT_PREFIX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    RecordStart,
    FieldStart,
    Unquoted,
    Quoted,
    // A quote seen inside a quoted field: either the closing quote or the first half of `""`.
    QuoteInQuoted,
}

/// Byte filter in front of the CSV parser.
///
/// Tracks field quoting the way the parser does. A physical line that starts a record with `#`
/// is blanked (its terminator is kept, so line numbers still match the input) before the parser
/// can see a quote in it. A quoted field open at end of input is recorded in
/// `unterminated_quote` with the line it started on.
struct CommentFilter<R> {
    inner: R,
    state: QuoteState,
    in_comment: bool,
    line: u64,
    quote_line: u64,
    unterminated_quote: Option<u64>,
}

impl<R> CommentFilter<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            state: QuoteState::RecordStart,
            in_comment: false,
            line: 1,
            quote_line: 1,
            unterminated_quote: None,
        }
    }

    /// Advance over `b`; returns whether it is passed on to the parser.
    fn keep(&mut self, b: u8) -> bool {
        let terminator = b == b'\n' || b == b'\r';
        if b == b'\n' {
            self.line += 1;
        }
        if self.in_comment {
            if terminator {
                self.in_comment = false;
                return true;
            }
            return false;
        }

        self.state = match (self.state, b) {
            (QuoteState::RecordStart, b'#') => {
                self.in_comment = true;
                return false;
            }
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::RecordStart | QuoteState::FieldStart, b'"') => {
                self.quote_line = self.line;
                QuoteState::Quoted
            }
            (_, b',') => QuoteState::FieldStart,
            (_, _) if terminator => QuoteState::RecordStart,
            (_, _) => QuoteState::Unquoted,
        };
        true
    }
}

impl<R: Read> Read for CommentFilter<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.inner.read(out)?;
            if n == 0 {
                if self.state == QuoteState::Quoted {
                    self.unterminated_quote = Some(self.quote_line);
                }
                return Ok(0);
            }
            let mut kept = 0;
            for i in 0..n {
                let b = out[i];
                if self.keep(b) {
                    out[kept] = b;
                    kept += 1;
                }
            }
            // A chunk made only of comment bytes yields nothing; read on rather than signal EOF.
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

/// Decode a whole upload into `(headers, rows)`.
pub fn decode_csv<R: Read>(reader: R) -> IngestionResult<(Vec<String>, Vec<Vec<String>>)> {
    let mut decoder = RecordDecoder::new(reader);
    let headers = decoder.read_headers()?;
    let rows = decoder
        .map(|row| row.map(|r| r.cells))
        .collect::<IngestionResult<Vec<_>>>()?;
    Ok((headers, rows))
}

/// Coerce a raw cell into the value implied by `declared_type`.
///
/// | type | coercion |
/// |---|---|
/// | `string` | verbatim |
/// | `integer` | base-10 `i64` |
/// | `float` | `f64` |
/// | `boolean` | `1 t T TRUE true True 0 f F FALSE false False` |
/// | `date`, `time`, `datetime` | base-10 `i64` (epoch-style number) |
///
/// Any other type, and any parse failure, is [`IngestionError::InvalidFieldValues`].
pub fn value_from_type(value: &str, declared_type: &str) -> IngestionResult<Value> {
    parse_typed_value(value, declared_type).map_err(IngestionError::invalid_value)
}

/// Like [`value_from_type`], with the row and column in the error message.
pub(crate) fn coerce_cell(
    line: u64,
    column: &str,
    declared_type: Option<&str>,
    raw: &str,
) -> IngestionResult<Value> {
    let Some(declared_type) = declared_type else {
        return Err(IngestionError::invalid_value(format!(
            "row {line} column '{column}': column is not defined in the schema"
        )));
    };
    parse_typed_value(raw, declared_type).map_err(|message| {
        IngestionError::invalid_value(format!(
            "row {line} column '{column}': {message} (raw='{raw}')"
        ))
    })
}

fn parse_typed_value(raw: &str, declared_type: &str) -> Result<Value, String> {
    match declared_type {
        "string" => Ok(Value::String(raw.to_owned())),
        "integer" | "date" | "time" | "datetime" => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("expected {declared_type}: {e}")),
        "float" => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("expected float: {e}")),
        "boolean" => parse_bool(raw)
            .map(Value::Boolean)
            .ok_or_else(|| "expected boolean (true/false/t/f/1/0)".to_string()),
        other => Err(format!("unsupported type '{other}'")),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
