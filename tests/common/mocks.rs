//! Mock version of a record sink;
use mockall::mock;

use map_reduce_rs::{
    core::{item::RecordSink, row::Record},
    error::MapReduceError,
};

mock! {
    pub Sink {}
    impl RecordSink for Sink {
        fn push(&self, record: &Record) -> Result<(), MapReduceError>;
        fn close(&self) -> Result<(), MapReduceError>;
    }
}
