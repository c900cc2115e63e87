use crate::core::row::{Record, Row};
use crate::error::MapReduceError;

/// Result of reading one row from a source.
///
/// - `Ok(Some(row))` if one more row is available
/// - `Ok(None)` once the source is exhausted
/// - `Err(..)` on a fatal read or parse error
pub type RowReaderResult = Result<Option<Row>, MapReduceError>;

/// Result of mapping one row.
///
/// `Ok(None)` is the skip marker: the row contributes nothing to any group.
/// This is expected control flow, not an error.
pub type RowMapperResult = Result<Option<Record>, MapReduceError>;

/// Result of reducing one mapped record into a group accumulator.
pub type ReducerResult = Result<Record, MapReduceError>;

/// A finite, forward-only, lazy producer of rows.
///
/// A reader is single-pass: once `read` returns `Ok(None)` the source is
/// exhausted and a fresh instance is needed to read it again. Implementations
/// keep their cursor behind interior mutability so that the engine can hold
/// plain shared references.
pub trait RowReader {
    /// Reads the next row, `Ok(None)` once the source is exhausted.
    fn read(&self) -> RowReaderResult;

    /// Human-readable source name used in progress reporting and logs.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// A streaming consumer of final records.
///
/// The engine pushes every accumulator, then calls `close` exactly once, even
/// when zero groups were produced. `close` must flush and release underlying
/// resources and be idempotent; a `push` after `close` is rejected with a
/// [`MapReduceError::Configuration`] error rather than silently corrupting
/// output.
pub trait RecordSink {
    /// Appends one record to the sink.
    fn push(&self, record: &Record) -> Result<(), MapReduceError>;

    /// Signals that no more data is forthcoming.
    fn close(&self) -> Result<(), MapReduceError>;
}

/// Transforms one source row into a mapped record, or skips it.
pub trait RowMapper {
    fn map(&self, row: &Row) -> RowMapperResult;
}

impl<F> RowMapper for F
where
    F: Fn(&Row) -> RowMapperResult,
{
    fn map(&self, row: &Row) -> RowMapperResult {
        self(row)
    }
}

/// Merges a freshly mapped record into a group's running accumulator.
///
/// `carry` is the accumulator built so far, absent on the very first call for
/// a group; with an absent carry the reducer must return a valid seed
/// accumulator. The engine seeds groups with the mapped record itself and
/// always passes `Some`, but the contract admits the absent case.
///
/// Numeric updates must be algebraically order-independent: the same final
/// accumulator must result for any permutation of the records sharing a key.
/// The exact incremental mean `(carry * count + new) / (count + 1)` has this
/// property; a reducer that replaces it should document whether it still does.
pub trait Reducer {
    fn reduce(&self, new: &Record, carry: Option<&Record>) -> ReducerResult;
}

impl<F> Reducer for F
where
    F: Fn(&Record, Option<&Record>) -> ReducerResult,
{
    fn reduce(&self, new: &Record, carry: Option<&Record>) -> ReducerResult {
        self(new, carry)
    }
}
