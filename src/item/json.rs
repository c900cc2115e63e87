use std::{
    cell::RefCell,
    fs::File,
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::{
    core::{item::RecordSink, row::Record},
    error::MapReduceError,
};

/// A [`RecordSink`] that writes each record as one JSON object per line.
pub struct JsonRecordWriter {
    stream: RefCell<Option<BufWriter<File>>>,
    path: PathBuf,
}

impl RecordSink for JsonRecordWriter {
    fn push(&self, record: &Record) -> Result<(), MapReduceError> {
        let mut stream = self.stream.borrow_mut();
        let Some(out) = stream.as_mut() else {
            return Err(MapReduceError::Configuration(format!(
                "push after close on json writer '{}'",
                self.path.display()
            )));
        };

        let json = serde_json::to_string(record).map_err(|source| {
            MapReduceError::io(&self.path, std::io::Error::other(source))
        })?;
        out.write_all(json.as_bytes())
            .and_then(|()| out.write_all(b"\n"))
            .map_err(|source| MapReduceError::io(&self.path, source))
    }

    fn close(&self) -> Result<(), MapReduceError> {
        if let Some(mut out) = self.stream.borrow_mut().take() {
            out.flush()
                .map_err(|source| MapReduceError::io(&self.path, source))?;
        }
        Ok(())
    }
}

/// A builder for configuring the JSON Lines record writer.
#[derive(Default)]
pub struct JsonRecordWriterBuilder {
    overwrite: bool,
}

impl JsonRecordWriterBuilder {
    pub fn new() -> Self {
        Self { overwrite: false }
    }

    /// Sets whether an existing target file may be replaced.
    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    /// Creates the writer and opens the target file.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<JsonRecordWriter, MapReduceError> {
        let path = path.as_ref().to_path_buf();
        if !self.overwrite && path.exists() {
            return Err(MapReduceError::io(
                &path,
                std::io::Error::new(ErrorKind::AlreadyExists, "output file already exists"),
            ));
        }
        let file = File::create(&path).map_err(|source| MapReduceError::io(&path, source))?;

        Ok(JsonRecordWriter {
            stream: RefCell::new(Some(BufWriter::new(file))),
            path,
        })
    }
}
