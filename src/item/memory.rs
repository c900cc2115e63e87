use std::cell::{Cell, RefCell};

use crate::{
    core::{
        item::{RecordSink, RowReader, RowReaderResult},
        row::{Record, Row},
    },
    error::MapReduceError,
};

/// A [`RowReader`] over an in-memory ordered sequence of pre-built rows.
///
/// # Examples
///
/// ```
/// use map_reduce_rs::core::item::RowReader;
/// use map_reduce_rs::core::row::Row;
/// use map_reduce_rs::item::memory::VecRowReader;
///
/// let reader = VecRowReader::new(vec![Row::from_values(vec!["a".to_owned()])]);
/// assert!(reader.read().unwrap().is_some());
/// assert!(reader.read().unwrap().is_none());
/// ```
pub struct VecRowReader {
    rows: RefCell<std::vec::IntoIter<Row>>,
    name: Option<String>,
}

impl VecRowReader {
    pub fn new(rows: Vec<Row>) -> Self {
        VecRowReader {
            rows: RefCell::new(rows.into_iter()),
            name: None,
        }
    }

    /// Names the source for progress reporting.
    pub fn named(name: impl Into<String>, rows: Vec<Row>) -> Self {
        VecRowReader {
            rows: RefCell::new(rows.into_iter()),
            name: Some(name.into()),
        }
    }
}

impl RowReader for VecRowReader {
    fn read(&self) -> RowReaderResult {
        Ok(self.rows.borrow_mut().next())
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// A [`RecordSink`] that collects every pushed record in memory.
///
/// Useful in tests and wherever the final accumulators are consumed
/// programmatically rather than persisted.
#[derive(Default)]
pub struct CollectingSink {
    records: RefCell<Vec<Record>>,
    closed: Cell<bool>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The records pushed so far, in emission order.
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    /// Whether the close signal was received.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl RecordSink for CollectingSink {
    fn push(&self, record: &Record) -> Result<(), MapReduceError> {
        if self.closed.get() {
            return Err(MapReduceError::Configuration(
                "push after close on collecting sink".to_owned(),
            ));
        }
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), MapReduceError> {
        self.closed.set(true);
        Ok(())
    }
}
