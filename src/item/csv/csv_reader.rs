use std::{
    cell::RefCell,
    fs::File,
    io::{BufReader, Bytes, Read},
    path::{Path, PathBuf},
};

use crate::{
    core::{
        item::{RowReader, RowReaderResult},
        row::Row,
    },
    error::MapReduceError,
};

/// A lazy, single-pass CSV row reader.
///
/// Decodes delimited text into [`Row`]s one at a time: fields split on the
/// separator outside quotes, a leading quote opens a quoted field, a doubled
/// quote inside a quoted field emits one literal quote, and quoted fields may
/// span physical lines. CR/LF line endings are normalized transparently.
///
/// The reader is forward-only and not restartable; create a fresh instance to
/// re-read an input.
///
/// # Type Parameters
///
/// - `R`: The source of the CSV bytes. Must implement `Read`.
///
/// # Examples
///
/// ```
/// use map_reduce_rs::item::csv::csv_reader::CsvRowReaderBuilder;
/// use map_reduce_rs::core::item::RowReader;
///
/// let data = "\
/// name,value
/// foo,123
/// bar,456
/// ";
///
/// let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());
///
/// let row = reader.read().unwrap().unwrap();
/// assert_eq!(row.get("name"), Some("foo"));
///
/// let row = reader.read().unwrap().unwrap();
/// assert_eq!(row.get("value"), Some("456"));
///
/// assert!(reader.read().unwrap().is_none());
/// ```
pub struct CsvRowReader<R> {
    /// Decoder state behind `RefCell`, so `read` can advance the cursor
    /// through the `&self` signature of the `RowReader` trait.
    decoder: RefCell<Decoder<R>>,
    name: String,
}

impl<R> std::fmt::Debug for CsvRowReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRowReader")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<R: Read> RowReader for CsvRowReader<R> {
    /// Reads the next data row.
    ///
    /// On the first call the header line is resolved (when enabled); every
    /// subsequent row is keyed by the header names, or by 0-based positions
    /// for headerless input.
    ///
    /// # Returns
    /// - `Ok(Some(row))` if a row was decoded
    /// - `Ok(None)` once the stream is exhausted, or on clean early
    ///   termination at a blank line with `stop_on_blank`
    /// - `Err(..)` on i/o failure, malformed quoting, an empty header line on
    ///   a non-empty stream, or a field count that does not match the header
    fn read(&self) -> RowReaderResult {
        self.decoder.borrow_mut().next_row()
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Quoting state of the field currently being decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldState {
    /// At the start of a field; a quote byte here opens a quoted field.
    FieldStart,
    /// Inside an unquoted field; quote bytes are literal here.
    Unquoted,
    /// Inside a quoted field.
    Quoted,
    /// Inside a quoted field, just saw a quote byte: either the field closes
    /// or a second quote byte follows and one literal quote is emitted.
    QuotedSawQuote,
    /// Inside a quoted field, just saw the escape byte (when it differs from
    /// the quote byte); the next byte is taken literally.
    QuotedEscape,
}

struct Decoder<R> {
    input: Bytes<BufReader<R>>,
    peeked: Option<u8>,
    path: PathBuf,
    separator: u8,
    quote: u8,
    escape: u8,
    has_headers: bool,
    stop_on_blank: bool,
    headers: Option<Vec<String>>,
    expected_fields: Option<usize>,
    /// Physical line the next record starts on, 1-based; used in errors.
    line: u64,
    done: bool,
}

impl<R: Read> Decoder<R> {
    fn next_row(&mut self) -> RowReaderResult {
        if self.done {
            return Ok(None);
        }

        if self.has_headers && self.headers.is_none() {
            let header_line = self.line;
            match self.read_record()? {
                None => {
                    self.done = true;
                    return Ok(None);
                }
                Some(fields) => {
                    if is_blank(&fields) {
                        // A blank header at end-of-stream is an empty input,
                        // not an error.
                        if self.at_end()? {
                            self.done = true;
                            return Ok(None);
                        }
                        return Err(self.format_err(header_line, "empty header line"));
                    }
                    self.expected_fields = Some(fields.len());
                    self.headers = Some(fields);
                }
            }
        }

        loop {
            let record_line = self.line;
            let Some(fields) = self.read_record()? else {
                self.done = true;
                return Ok(None);
            };

            if is_blank(&fields) {
                if self.stop_on_blank {
                    self.done = true;
                    return Ok(None);
                }
                continue;
            }

            let expected = *self.expected_fields.get_or_insert(fields.len());
            if fields.len() != expected {
                return Err(self.format_err(
                    record_line,
                    format!("expected {} fields, found {}", expected, fields.len()),
                ));
            }

            let row = match &self.headers {
                Some(headers) => Row::from_headers(headers, fields),
                None => Row::from_values(fields),
            };
            return Ok(Some(row));
        }
    }

    /// Decodes one raw record, spanning physical lines when a quoted field
    /// contains newlines. `Ok(None)` only when the stream ends before any
    /// byte of a new record.
    fn read_record(&mut self) -> Result<Option<Vec<String>>, MapReduceError> {
        let start_line = self.line;
        let mut fields: Vec<String> = Vec::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut state = FieldState::FieldStart;

        loop {
            let Some(byte) = self.next_byte()? else {
                return match state {
                    FieldState::Quoted | FieldState::QuotedEscape => Err(self.format_err(
                        start_line,
                        "unterminated quoted field at end of stream",
                    )),
                    FieldState::FieldStart if fields.is_empty() && buf.is_empty() => Ok(None),
                    _ => {
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        Ok(Some(fields))
                    }
                };
            };

            match state {
                FieldState::FieldStart => {
                    if byte == self.quote {
                        state = FieldState::Quoted;
                    } else if byte == self.separator {
                        fields.push(self.finish_field(&mut buf, start_line)?);
                    } else if byte == b'\n' || byte == b'\r' {
                        self.consume_newline(byte)?;
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        return Ok(Some(fields));
                    } else {
                        buf.push(byte);
                        state = FieldState::Unquoted;
                    }
                }
                FieldState::Unquoted => {
                    if byte == self.separator {
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        state = FieldState::FieldStart;
                    } else if byte == b'\n' || byte == b'\r' {
                        self.consume_newline(byte)?;
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        return Ok(Some(fields));
                    } else {
                        buf.push(byte);
                    }
                }
                FieldState::Quoted => {
                    if byte == self.quote {
                        state = FieldState::QuotedSawQuote;
                    } else if byte == self.escape {
                        state = FieldState::QuotedEscape;
                    } else if byte == b'\n' || byte == b'\r' {
                        self.consume_newline(byte)?;
                        buf.push(b'\n');
                    } else {
                        buf.push(byte);
                    }
                }
                FieldState::QuotedEscape => {
                    buf.push(byte);
                    state = FieldState::Quoted;
                }
                FieldState::QuotedSawQuote => {
                    if byte == self.quote {
                        // Doubled quote: one literal quote, still quoted.
                        buf.push(self.quote);
                        state = FieldState::Quoted;
                    } else if byte == self.separator {
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        state = FieldState::FieldStart;
                    } else if byte == b'\n' || byte == b'\r' {
                        self.consume_newline(byte)?;
                        fields.push(self.finish_field(&mut buf, start_line)?);
                        return Ok(Some(fields));
                    } else {
                        // Text after a closing quote continues the field
                        // unquoted.
                        buf.push(byte);
                        state = FieldState::Unquoted;
                    }
                }
            }
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, MapReduceError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        match self.input.next() {
            Some(Ok(byte)) => Ok(Some(byte)),
            Some(Err(source)) => Err(MapReduceError::io(&self.path, source)),
            None => Ok(None),
        }
    }

    /// Counts the line break and, after a CR, swallows the LF of a CRLF pair.
    fn consume_newline(&mut self, byte: u8) -> Result<(), MapReduceError> {
        if byte == b'\r' {
            if let Some(next) = self.next_byte()? {
                if next != b'\n' {
                    self.peeked = Some(next);
                }
            }
        }
        self.line += 1;
        Ok(())
    }

    fn at_end(&mut self) -> Result<bool, MapReduceError> {
        match self.next_byte()? {
            Some(byte) => {
                self.peeked = Some(byte);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn finish_field(&mut self, buf: &mut Vec<u8>, line: u64) -> Result<String, MapReduceError> {
        String::from_utf8(std::mem::take(buf))
            .map_err(|_| self.format_err(line, "invalid UTF-8 in field"))
    }

    fn format_err(&self, line: u64, message: impl Into<String>) -> MapReduceError {
        MapReduceError::format(&self.path, line, message)
    }
}

/// A record is blank when it holds a single empty or whitespace-only field.
fn is_blank(fields: &[String]) -> bool {
    fields.len() == 1 && fields[0].trim().is_empty()
}

/// A builder for configuring CSV row reading.
///
/// # Default Configuration
///
/// - Separator: comma (`b','`)
/// - Quote: double quote (`b'"'`)
/// - Escape: same as the quote byte (doubling)
/// - Headers: enabled (first line names the fields)
/// - Blank lines: skipped
///
/// # Examples
///
/// ```
/// use map_reduce_rs::item::csv::csv_reader::CsvRowReaderBuilder;
/// use map_reduce_rs::core::item::RowReader;
///
/// let reader = CsvRowReaderBuilder::new()
///     .separator(b';')
///     .has_headers(false)
///     .from_reader("a;b\nc;d".as_bytes());
///
/// let row = reader.read().unwrap().unwrap();
/// assert_eq!(row.get_index(0), Some("a"));
/// assert_eq!(row.get_index(1), Some("b"));
/// ```
pub struct CsvRowReaderBuilder {
    separator: u8,
    quote: u8,
    escape: u8,
    has_headers: bool,
    stop_on_blank: bool,
}

impl Default for CsvRowReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvRowReaderBuilder {
    pub fn new() -> Self {
        Self {
            separator: b',',
            quote: b'"',
            escape: b'"',
            has_headers: true,
            stop_on_blank: false,
        }
    }

    /// Sets the field separator byte.
    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Sets the quote byte that opens and closes quoted fields.
    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Sets the escape byte. It defaults to the quote byte, which gives the
    /// usual doubled-quote escaping; a different byte protects the byte that
    /// follows it inside quoted fields.
    pub fn escape(mut self, escape: u8) -> Self {
        self.escape = escape;
        self
    }

    /// Sets whether the first line names the fields. When disabled, rows are
    /// keyed by 0-based position.
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Sets whether a blank line terminates decoding early. When disabled,
    /// blank lines are skipped.
    pub fn stop_on_blank(mut self, yes: bool) -> Self {
        self.stop_on_blank = yes;
        self
    }

    /// Creates a `CsvRowReader` from any `Read` source.
    pub fn from_reader<R: Read>(self, rdr: R) -> CsvRowReader<R> {
        self.build(rdr, PathBuf::from("<reader>"))
    }

    /// Creates a `CsvRowReader` from a file path.
    ///
    /// Fails with [`MapReduceError::Io`] when the file does not exist or
    /// cannot be opened.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvRowReader<File>, MapReduceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MapReduceError::io(path, source))?;
        Ok(self.build(file, path.to_path_buf()))
    }

    fn build<R: Read>(self, rdr: R, path: PathBuf) -> CsvRowReader<R> {
        let name = path.display().to_string();
        CsvRowReader {
            decoder: RefCell::new(Decoder {
                input: BufReader::new(rdr).bytes(),
                peeked: None,
                path,
                separator: self.separator,
                quote: self.quote,
                escape: self.escape,
                has_headers: self.has_headers,
                stop_on_blank: self.stop_on_blank,
                headers: None,
                expected_fields: None,
                line: 1,
                done: false,
            }),
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reader: &impl RowReader) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = reader.read().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn decodes_doubled_quotes_inside_quoted_fields() {
        let data = "h1,h2\n\"a\"\"b\",plain\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("h1"), Some("a\"b"));
        assert_eq!(rows[0].get("h2"), Some("plain"));
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let data = "h1,h2\n\"line one\nline two\",x\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows[0].get("h1"), Some("line one\nline two"));
    }

    #[test]
    fn crlf_is_normalized() {
        let data = "h1,h2\r\na,b\r\nc,d\r\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("h2"), Some("d"));
    }

    #[test]
    fn distinct_escape_byte_protects_the_next_byte() {
        let data = "h1\n\"a\\\"b\"\n";
        let reader = CsvRowReaderBuilder::new()
            .escape(b'\\')
            .from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows[0].get("h1"), Some("a\"b"));
    }

    #[test]
    fn unterminated_quote_is_a_format_error() {
        let data = "h1,h2\n\"oops,b\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let err = loop {
            match reader.read() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a format error"),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, MapReduceError::Format { line: 2, .. }));
    }

    #[test]
    fn field_count_mismatch_is_a_format_error() {
        let data = "h1,h2\na,b\nc\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        assert!(reader.read().unwrap().is_some());
        let err = reader.read().unwrap_err();
        assert!(matches!(err, MapReduceError::Format { line: 3, .. }));
    }

    #[test]
    fn blank_lines_are_skipped_by_default() {
        let data = "h1,h2\na,b\n\nc,d\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn stop_on_blank_terminates_cleanly() {
        let data = "h1,h2\na,b\n\nc,d\n";
        let reader = CsvRowReaderBuilder::new()
            .stop_on_blank(true)
            .from_reader(data.as_bytes());

        let rows = read_all(&reader);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("h1"), Some("a"));
    }

    #[test]
    fn empty_header_line_with_more_data_is_fatal() {
        let data = "\nh1,h2\n";
        let reader = CsvRowReaderBuilder::new().from_reader(data.as_bytes());

        let err = reader.read().unwrap_err();
        assert!(matches!(err, MapReduceError::Format { line: 1, .. }));
    }

    #[test]
    fn blank_header_line_at_end_of_stream_is_empty_input() {
        let reader = CsvRowReaderBuilder::new().from_reader("\n".as_bytes());
        assert!(reader.read().unwrap().is_none());
    }
}
