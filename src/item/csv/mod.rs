/// CSV support for reading and writing tabular data.
///
/// The decoder and encoder share one quoting grammar: fields split on the
/// separator outside quotes, a doubled quote inside a quoted field stands for
/// one literal quote, and a field is quoted on write exactly when it contains
/// the separator, the quote byte or a line break. Because the two sides
/// mirror each other, decode → encode round-trips the logical rows of any
/// well-formed input, whatever its original quoting style.
///
/// Both components follow the builder pattern for configuration and
/// implement the core `RowReader` / `RecordSink` traits, so they plug
/// directly into a map-reduce run.
pub mod csv_reader;

/// A module providing facilities for writing CSV records, with optional
/// output splitting.
pub mod csv_writer;
