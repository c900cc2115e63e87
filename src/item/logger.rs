use log::info;

use crate::{core::item::RecordSink, core::row::Record, error::MapReduceError};

/// A [`RecordSink`] that logs every record, useful for debugging.
#[derive(Default)]
pub struct LoggerSink {}

impl RecordSink for LoggerSink {
    fn push(&self, record: &Record) -> Result<(), MapReduceError> {
        info!("Record:{:?}", record);
        Ok(())
    }

    fn close(&self) -> Result<(), MapReduceError> {
        info!("Finished");
        Ok(())
    }
}
