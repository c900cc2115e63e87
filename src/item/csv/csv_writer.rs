use std::{
    cell::RefCell,
    fs::File,
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    core::{item::RecordSink, row::Record},
    error::MapReduceError,
};

/// A [`RecordSink`] that serializes each pushed record into one delimited
/// text line.
///
/// The header line is derived from the first pushed record's field names and
/// written before the first data line of every output file. A field value is
/// quoted iff it contains the separator, the quote byte, or a line break;
/// embedded quotes are escaped with the escape byte (doubled under the
/// default configuration).
///
/// With `split_after > 0`, the writer closes the current file after every N
/// rows and continues in `stem.<n>.ext`, re-emitting the header there. At
/// most one file handle is open at a time, and closing the old handle
/// strictly precedes opening the new one.
#[derive(Debug)]
pub struct CsvRecordWriter {
    state: RefCell<WriterState>,
}

#[derive(Debug)]
struct WriterState {
    /// Path the writer was built with; split files derive from it.
    base_path: PathBuf,
    /// Path of the currently-open file, for error context.
    current_path: PathBuf,
    overwrite: bool,
    separator: u8,
    quote: u8,
    escape: u8,
    split_after: usize,
    out: Option<BufWriter<File>>,
    header: Option<Vec<String>>,
    rows_in_file: usize,
    /// Numbering for split continuation files, starting at 1.
    splits: usize,
    closed: bool,
}

impl RecordSink for CsvRecordWriter {
    /// Appends one record as a delimited line, splitting the output file
    /// first when the configured row count was reached.
    fn push(&self, record: &Record) -> Result<(), MapReduceError> {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return Err(MapReduceError::Configuration(format!(
                "push after close on csv writer '{}'",
                state.base_path.display()
            )));
        }

        if state.out.is_none() {
            state.open_next_split()?;
        }

        if state.header.is_none() {
            let header: Vec<String> = record.keys().map(str::to_owned).collect();
            state.write_line(&header)?;
            state.header = Some(header);
        }

        let values: Vec<String> = record.iter().map(|(_, v)| v.to_string()).collect();
        state.write_line(&values)?;
        state.rows_in_file += 1;

        if state.split_after > 0 && state.rows_in_file >= state.split_after {
            state.close_current()?;
        }

        Ok(())
    }

    /// Flushes and closes the currently-open file handle. Idempotent: closing
    /// an already-closed writer is a no-op.
    fn close(&self) -> Result<(), MapReduceError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Ok(());
        }
        state.close_current()?;
        state.closed = true;
        Ok(())
    }
}

impl WriterState {
    fn open_next_split(&mut self) -> Result<(), MapReduceError> {
        let path = split_path(&self.base_path, self.splits);
        debug!("Opening split file '{}'", path.display());
        let file = create_file(&path, self.overwrite)?;
        self.out = Some(BufWriter::new(file));
        self.current_path = path;
        self.splits += 1;
        self.rows_in_file = 0;

        // Continuation files repeat the header before their first row.
        if let Some(header) = self.header.clone() {
            self.write_line(&header)?;
        }
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), MapReduceError> {
        if let Some(mut out) = self.out.take() {
            out.flush()
                .map_err(|source| MapReduceError::io(&self.current_path, source))?;
        }
        Ok(())
    }

    fn write_line(&mut self, fields: &[String]) -> Result<(), MapReduceError> {
        let mut line: Vec<u8> = Vec::new();
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                line.push(self.separator);
            }
            self.encode_field(field, &mut line);
        }
        line.push(b'\n');

        let Some(out) = self.out.as_mut() else {
            return Err(MapReduceError::Configuration(format!(
                "csv writer '{}' has no open file",
                self.base_path.display()
            )));
        };
        out.write_all(&line)
            .map_err(|source| MapReduceError::io(&self.current_path, source))
    }

    fn encode_field(&self, field: &str, line: &mut Vec<u8>) {
        let bytes = field.as_bytes();
        let needs_quoting = bytes
            .iter()
            .any(|&b| b == self.separator || b == self.quote || b == b'\n' || b == b'\r');

        if !needs_quoting {
            line.extend_from_slice(bytes);
            return;
        }

        line.push(self.quote);
        for &b in bytes {
            if b == self.quote || b == self.escape {
                line.push(self.escape);
            }
            line.push(b);
        }
        line.push(self.quote);
    }
}

fn create_file(path: &Path, overwrite: bool) -> Result<File, MapReduceError> {
    if !overwrite && path.exists() {
        return Err(MapReduceError::io(
            path,
            std::io::Error::new(ErrorKind::AlreadyExists, "output file already exists"),
        ));
    }
    File::create(path).map_err(|source| MapReduceError::io(path, source))
}

/// `out.csv` continues in `out.1.csv`, `out.2.csv`, ...; `n == 0` is the
/// base path itself.
fn split_path(base: &Path, n: usize) -> PathBuf {
    if n == 0 {
        return base.to_path_buf();
    }
    match (base.file_stem(), base.extension()) {
        (Some(stem), Some(ext)) => base.with_file_name(format!(
            "{}.{}.{}",
            stem.to_string_lossy(),
            n,
            ext.to_string_lossy()
        )),
        _ => {
            let mut name = base.as_os_str().to_owned();
            name.push(format!(".{}", n));
            PathBuf::from(name)
        }
    }
}

/// A builder for configuring CSV record writing.
///
/// # Default Configuration
///
/// - Separator: comma, quote and escape: double quote (doubling)
/// - `overwrite`: false; building against an existing path fails
/// - `split_after`: 0 (never split)
///
/// # Examples
///
/// ```no_run
/// use map_reduce_rs::item::csv::csv_writer::CsvRecordWriterBuilder;
///
/// let writer = CsvRecordWriterBuilder::new()
///     .overwrite(true)
///     .split_after(100_000)
///     .from_path("out.csv")
///     .unwrap();
/// ```
pub struct CsvRecordWriterBuilder {
    overwrite: bool,
    separator: u8,
    quote: u8,
    escape: u8,
    split_after: usize,
}

impl Default for CsvRecordWriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvRecordWriterBuilder {
    pub fn new() -> Self {
        Self {
            overwrite: false,
            separator: b',',
            quote: b'"',
            escape: b'"',
            split_after: 0,
        }
    }

    /// Sets whether an existing target file may be replaced. Off by default;
    /// building against an existing path then fails with
    /// [`MapReduceError::Io`] before any row is processed.
    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    /// Sets the field separator byte.
    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Sets the quote byte.
    pub fn quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Sets the escape byte used in front of embedded quotes. Defaults to the
    /// quote byte, which doubles them.
    pub fn escape(mut self, escape: u8) -> Self {
        self.escape = escape;
        self
    }

    /// Splits the output after every `n` rows; 0 never splits.
    pub fn split_after(mut self, n: usize) -> Self {
        self.split_after = n;
        self
    }

    /// Creates the writer and opens the target file.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvRecordWriter, MapReduceError> {
        let base_path = path.as_ref().to_path_buf();
        let file = create_file(&base_path, self.overwrite)?;

        Ok(CsvRecordWriter {
            state: RefCell::new(WriterState {
                current_path: base_path.clone(),
                base_path,
                overwrite: self.overwrite,
                separator: self.separator,
                quote: self.quote,
                escape: self.escape,
                split_after: self.split_after,
                out: Some(BufWriter::new(file)),
                header: None,
                rows_in_file: 0,
                splits: 1,
                closed: false,
            }),
        })
    }
}
