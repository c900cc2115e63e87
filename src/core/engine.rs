use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use indexmap::{map::Entry, IndexMap};
use log::{debug, info};
use uuid::Uuid;

use crate::{
    core::{
        item::{RecordSink, Reducer, RowMapper, RowReader},
        row::{GroupKey, Record},
    },
    error::MapReduceError,
};

use super::build_name;

/// Type alias for run results.
type RunResult<T> = Result<T, MapReduceError>;

/// How the engine derives the group key of a mapped record.
///
/// Key derivation is a pure function of the mapped record alone; no grouping
/// mode may consult cross-row state.
#[derive(Default)]
pub enum GroupBy<'a> {
    /// No grouping: the whole input reduces into one implicit group.
    #[default]
    None,

    /// Key on the first field of the mapped record, in insertion order.
    ///
    /// This mirrors the historical `group_by = true` behavior and is fragile
    /// to field-order changes in the map function; prefer [`GroupBy::Field`]
    /// with an explicit name.
    FirstField,

    /// Key on a named field of the mapped record. A mapped record missing the
    /// field is a fatal configuration error.
    Field(String),

    /// Key through a user function of the mapped record.
    KeyFn(&'a dyn Fn(&Record) -> GroupKey),
}

/// Progress notification fired during a run.
///
/// Purely observational: listeners never affect output. `total` counts rows
/// across all sources, `in_source` rows within the current source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress<'a> {
    RunStarted,
    SourceStarted {
        source: usize,
        name: Option<&'a str>,
    },
    Lines {
        source: usize,
        total: u64,
        in_source: u64,
    },
    SourceFinished {
        source: usize,
        name: Option<&'a str>,
        in_source: u64,
        total: u64,
    },
    RunFinished {
        total: u64,
    },
}

/// Receives [`Progress`] events during a run.
pub trait ProgressListener {
    fn on_progress(&self, event: &Progress<'_>);
}

impl<F> ProgressListener for F
where
    F: Fn(&Progress<'_>),
{
    fn on_progress(&self, event: &Progress<'_>) {
        self(event)
    }
}

/// Lifecycle of one engine instance. A failure in any phase is terminal for
/// the run; there is no retry or resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Draining,
    Finished,
}

/// Represents the execution of a run.
///
/// Contains timing information and the row/group counters of a completed
/// run, useful for monitoring and reporting.
#[derive(Debug)]
pub struct RunExecution {
    /// The time when the run started executing
    pub start: Instant,
    /// The time when the run finished executing
    pub end: Instant,
    /// The total duration of the run
    pub duration: Duration,
    /// Rows read across all sources
    pub rows_read: u64,
    /// Accumulators emitted to every sink
    pub groups_emitted: usize,
}

/// A streaming grouped map-reduce run over one or more row sources.
///
/// The engine pulls rows from each source in turn, applies the map function,
/// derives a group key, merges into an insertion-ordered accumulator table,
/// and once every source is exhausted emits each accumulator (in
/// first-seen-key order) to every sink before closing each sink exactly once.
///
/// Execution is strictly synchronous and single-threaded: one row is fully
/// mapped, keyed and reduced before the next is read, and emission starts
/// only after all sources are drained.
///
/// # Examples
///
/// ```
/// use map_reduce_rs::core::engine::{GroupBy, MapReduceBuilder};
/// use map_reduce_rs::core::item::{RowMapperResult, ReducerResult};
/// use map_reduce_rs::core::row::{Record, Row};
/// use map_reduce_rs::item::memory::{CollectingSink, VecRowReader};
///
/// let rows = vec![
///     Row::from_headers(&["fruit".into(), "n".into()], vec!["apple".into(), "2".into()]),
///     Row::from_headers(&["fruit".into(), "n".into()], vec!["apple".into(), "3".into()]),
/// ];
/// let source = VecRowReader::new(rows);
/// let sink = CollectingSink::new();
///
/// let map = |row: &Row| -> RowMapperResult {
///     let mut record = Record::new();
///     record.insert("fruit", row.get("fruit").unwrap_or_default());
///     record.insert("n", row.get("n").unwrap_or("0").parse::<i64>().unwrap_or(0));
///     Ok(Some(record))
/// };
/// let reduce = |new: &Record, carry: Option<&Record>| -> ReducerResult {
///     let mut merged = carry.cloned().unwrap_or_else(|| new.clone());
///     if carry.is_some() {
///         let total = merged.get_i64("n").unwrap_or(0) + new.get_i64("n").unwrap_or(0);
///         merged.insert("n", total);
///     }
///     Ok(merged)
/// };
///
/// let engine = MapReduceBuilder::new()
///     .source(&source)
///     .mapper(&map)
///     .reducer(&reduce)
///     .group_by(GroupBy::Field("fruit".to_owned()))
///     .sink(&sink)
///     .build()
///     .unwrap();
///
/// let execution = engine.run().unwrap();
/// assert_eq!(execution.rows_read, 2);
/// assert_eq!(execution.groups_emitted, 1);
/// assert_eq!(sink.records()[0].get_i64("n"), Some(5));
/// ```
pub struct MapReduce<'a> {
    /// Unique identifier for this run instance
    id: Uuid,
    /// Human-readable name for the run
    name: String,
    sources: Vec<&'a dyn RowReader>,
    mapper: &'a dyn RowMapper,
    reducer: &'a dyn Reducer,
    sinks: Vec<&'a dyn RecordSink>,
    group_by: GroupBy<'a>,
    progress: Option<&'a dyn ProgressListener>,
    progress_each: u64,
    phase: Cell<Phase>,
}

impl std::fmt::Debug for MapReduce<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapReduce")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MapReduce<'_> {
    /// Runs the map-reduce to completion.
    ///
    /// Drives the `NotStarted → Running → Draining → Finished` lifecycle:
    ///
    /// 1. Consumes every source in order, mapping, keying and reducing each
    ///    row as it is read.
    /// 2. Emits every accumulator, in first-seen-key order, to every sink in
    ///    sink list order.
    /// 3. Closes every sink exactly once, in the same order, even when zero
    ///    groups were produced.
    ///
    /// Any error aborts immediately and propagates; the instance cannot be
    /// run again (create a fresh one instead).
    pub fn run(&self) -> RunResult<RunExecution> {
        if self.phase.get() != Phase::NotStarted {
            return Err(MapReduceError::Configuration(format!(
                "run '{}' has already been started",
                self.name
            )));
        }
        self.phase.set(Phase::Running);

        let start = Instant::now();
        info!("Start of run: {}, id: {}", self.name, self.id);
        self.notify(&Progress::RunStarted);

        let mut table: IndexMap<GroupKey, Record> = IndexMap::new();
        let mut total: u64 = 0;

        for (index, source) in self.sources.iter().enumerate() {
            debug!("Start of source #{}", index);
            self.notify(&Progress::SourceStarted {
                source: index,
                name: source.name(),
            });

            let mut in_source: u64 = 0;
            while let Some(row) = source.read()? {
                total += 1;
                in_source += 1;

                if in_source % self.progress_each == 0 {
                    self.notify(&Progress::Lines {
                        source: index,
                        total,
                        in_source,
                    });
                }

                let Some(mapped) = self.mapper.map(&row)? else {
                    continue;
                };
                if mapped.is_empty() {
                    return Err(MapReduceError::Configuration(
                        "map function returned an empty record".to_owned(),
                    ));
                }

                let key = self.group_key(&mapped)?;
                match table.entry(key) {
                    Entry::Occupied(mut entry) => {
                        let merged = self.reducer.reduce(&mapped, Some(entry.get()))?;
                        entry.insert(merged);
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(mapped);
                    }
                }
            }

            debug!("End of source #{}, rows: {}", index, in_source);
            self.notify(&Progress::SourceFinished {
                source: index,
                name: source.name(),
                in_source,
                total,
            });
        }

        self.notify(&Progress::RunFinished { total });

        self.phase.set(Phase::Draining);
        debug!("Draining {} groups to {} sinks", table.len(), self.sinks.len());
        for accumulator in table.values() {
            for sink in &self.sinks {
                sink.push(accumulator)?;
            }
        }
        for sink in &self.sinks {
            sink.close()?;
        }
        self.phase.set(Phase::Finished);

        info!(
            "End of run: {}, id: {}, rows: {}, groups: {}",
            self.name,
            self.id,
            total,
            table.len()
        );

        Ok(RunExecution {
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            rows_read: total,
            groups_emitted: table.len(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn group_key(&self, mapped: &Record) -> RunResult<GroupKey> {
        match &self.group_by {
            GroupBy::None => Ok(GroupKey::Str(GroupKey::NO_KEY.to_owned())),
            GroupBy::FirstField => match mapped.first() {
                Some((_, value)) => Ok(GroupKey::from(value)),
                None => Err(MapReduceError::Configuration(
                    "cannot derive a first-field key from an empty record".to_owned(),
                )),
            },
            GroupBy::Field(name) => match mapped.get(name) {
                Some(value) => Ok(GroupKey::from(value)),
                None => Err(MapReduceError::Configuration(format!(
                    "group field '{}' missing from mapped record",
                    name
                ))),
            },
            GroupBy::KeyFn(key_fn) => Ok(key_fn(mapped)),
        }
    }

    fn notify(&self, event: &Progress<'_>) {
        if let Some(listener) = self.progress {
            listener.on_progress(event);
        }
    }
}

/// Builder for creating a [`MapReduce`] run.
///
/// Sources and sinks are added in the order they should be consumed and
/// emitted to. `build` validates the configuration: at least one source, a
/// map function and a reduce function are required.
pub struct MapReduceBuilder<'a> {
    /// Optional name for the run (generated randomly if not specified)
    name: Option<String>,
    sources: Vec<&'a dyn RowReader>,
    mapper: Option<&'a dyn RowMapper>,
    reducer: Option<&'a dyn Reducer>,
    sinks: Vec<&'a dyn RecordSink>,
    group_by: GroupBy<'a>,
    progress: Option<&'a dyn ProgressListener>,
    progress_each: u64,
}

impl Default for MapReduceBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MapReduceBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            sources: Vec::new(),
            mapper: None,
            reducer: None,
            sinks: Vec::new(),
            group_by: GroupBy::None,
            progress: None,
            progress_each: 10_000,
        }
    }

    /// Sets the name of the run, used in logs and error messages.
    pub fn name(mut self, name: String) -> MapReduceBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Adds a row source. Sources are read sequentially in the order they
    /// were added, with no interleaving.
    pub fn source(mut self, source: &'a impl RowReader) -> MapReduceBuilder<'a> {
        self.sources.push(source);
        self
    }

    /// Sets the map function.
    pub fn mapper(mut self, mapper: &'a impl RowMapper) -> MapReduceBuilder<'a> {
        self.mapper = Some(mapper);
        self
    }

    /// Sets the reduce function.
    pub fn reducer(mut self, reducer: &'a impl Reducer) -> MapReduceBuilder<'a> {
        self.reducer = Some(reducer);
        self
    }

    /// Adds a sink. Every sink receives every final accumulator, in the
    /// order the sinks were added.
    pub fn sink(mut self, sink: &'a impl RecordSink) -> MapReduceBuilder<'a> {
        self.sinks.push(sink);
        self
    }

    /// Sets the grouping mode. Defaults to [`GroupBy::None`].
    pub fn group_by(mut self, group_by: GroupBy<'a>) -> MapReduceBuilder<'a> {
        self.group_by = group_by;
        self
    }

    /// Sets the progress listener.
    pub fn progress(mut self, listener: &'a impl ProgressListener) -> MapReduceBuilder<'a> {
        self.progress = Some(listener);
        self
    }

    /// Sets how many rows elapse within a source between periodic `Lines`
    /// progress events. Defaults to 10 000.
    pub fn progress_each(mut self, progress_each: u64) -> MapReduceBuilder<'a> {
        self.progress_each = progress_each.max(1);
        self
    }

    /// Builds the run, validating the configuration.
    pub fn build(self) -> RunResult<MapReduce<'a>> {
        if self.sources.is_empty() {
            return Err(MapReduceError::Configuration(
                "at least one source is required".to_owned(),
            ));
        }
        let Some(mapper) = self.mapper else {
            return Err(MapReduceError::Configuration(
                "a map function is required".to_owned(),
            ));
        };
        let Some(reducer) = self.reducer else {
            return Err(MapReduceError::Configuration(
                "a reduce function is required".to_owned(),
            ));
        };

        Ok(MapReduce {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            sources: self.sources,
            mapper,
            reducer,
            sinks: self.sinks,
            group_by: self.group_by,
            progress: self.progress,
            progress_each: self.progress_each,
            phase: Cell::new(Phase::NotStarted),
        })
    }
}
