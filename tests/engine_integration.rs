mod common;

use std::cell::RefCell;

use common::mocks::MockSink;
use map_reduce_rs::{
    core::{
        engine::{GroupBy, MapReduceBuilder, Phase, Progress},
        item::{ReducerResult, RowMapperResult},
        row::{GroupKey, Record, Row},
    },
    error::MapReduceError,
    item::{
        csv::csv_reader::CsvRowReaderBuilder,
        memory::{CollectingSink, VecRowReader},
    },
};

fn insurance_headers() -> Vec<String> {
    ["state", "county", "lat", "lng"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn insurance_row(state: &str, county: &str, lat: &str, lng: &str) -> Row {
    Row::from_headers(
        &insurance_headers(),
        vec![
            state.to_owned(),
            county.to_owned(),
            lat.to_owned(),
            lng.to_owned(),
        ],
    )
}

/// Uppercases the first letter of the county and keys on "<state> - <County>".
fn insurance_map(row: &Row) -> RowMapperResult {
    let county = row.get("county").unwrap_or_default().to_lowercase();
    let county = match county.chars().next() {
        Some(first) => first.to_uppercase().to_string() + &county[first.len_utf8()..],
        None => county,
    };

    let mut record = Record::new();
    record.insert(
        "state_county",
        format!("{} - {}", row.get("state").unwrap_or_default(), county),
    );
    record.insert("count", 1i64);
    record.insert(
        "lat",
        row.get("lat").unwrap_or("0").parse::<f64>().unwrap_or(0.0),
    );
    record.insert(
        "lng",
        row.get("lng").unwrap_or("0").parse::<f64>().unwrap_or(0.0),
    );
    Ok(Some(record))
}

/// Exact incremental mean of lat/lng plus a count; order-independent.
fn insurance_reduce(new: &Record, carry: Option<&Record>) -> ReducerResult {
    let Some(carry) = carry else {
        let mut seed = new.clone();
        seed.insert("count", 1i64);
        return Ok(seed);
    };

    let count = carry.get_i64("count").unwrap_or(0) + 1;
    let lat = (carry.get_f64("lat").unwrap_or(0.0) * (count - 1) as f64
        + new.get_f64("lat").unwrap_or(0.0))
        / count as f64;
    let lng = (carry.get_f64("lng").unwrap_or(0.0) * (count - 1) as f64
        + new.get_f64("lng").unwrap_or(0.0))
        / count as f64;

    let mut merged = carry.clone();
    merged.insert("count", count);
    merged.insert("lat", lat);
    merged.insert("lng", lng);
    Ok(merged)
}

#[test]
fn groups_rows_with_case_insensitive_county_into_one_accumulator() {
    let source = VecRowReader::new(vec![
        insurance_row("FL", "bay", "30.0", "-85.0"),
        insurance_row("FL", "Bay", "30.2", "-85.2"),
    ]);
    let csv_sink = CollectingSink::new();
    let log_sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .group_by(GroupBy::FirstField)
        .sink(&csv_sink)
        .sink(&log_sink)
        .build()
        .unwrap();

    let execution = engine.run().unwrap();

    assert_eq!(execution.rows_read, 2);
    assert_eq!(execution.groups_emitted, 1);
    assert_eq!(engine.phase(), Phase::Finished);

    for sink in [&csv_sink, &log_sink] {
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("state_county"), Some("FL - Bay"));
        assert_eq!(records[0].get_i64("count"), Some(2));
        assert_eq!(records[0].get_f64("lat"), Some(30.1));
        assert_eq!(records[0].get_f64("lng"), Some(-85.1));
        assert!(sink.is_closed());
    }
}

#[test]
fn reduction_is_order_independent_within_a_group() {
    let rows = [
        ("10.0", "20.0", "30.0"),
        ("10.0", "30.0", "20.0"),
        ("20.0", "10.0", "30.0"),
        ("30.0", "20.0", "10.0"),
        ("30.0", "10.0", "20.0"),
        ("20.0", "30.0", "10.0"),
    ];

    for (a, b, c) in rows {
        let source = VecRowReader::new(vec![
            insurance_row("FL", "bay", a, "0"),
            insurance_row("FL", "bay", b, "0"),
            insurance_row("FL", "bay", c, "0"),
        ]);
        let sink = CollectingSink::new();

        let engine = MapReduceBuilder::new()
            .source(&source)
            .mapper(&insurance_map)
            .reducer(&insurance_reduce)
            .group_by(GroupBy::FirstField)
            .sink(&sink)
            .build()
            .unwrap();
        engine.run().unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_f64("lat"), Some(20.0));
        assert_eq!(records[0].get_i64("count"), Some(3));
    }
}

#[test]
fn sources_are_concatenated_in_order() {
    let first = VecRowReader::named(
        "first",
        vec![
            insurance_row("FL", "bay", "1.0", "0"),
            insurance_row("FL", "lee", "2.0", "0"),
            insurance_row("FL", "polk", "3.0", "0"),
        ],
    );
    let second = VecRowReader::named(
        "second",
        vec![
            insurance_row("GA", "hall", "4.0", "0"),
            insurance_row("GA", "cobb", "5.0", "0"),
        ],
    );
    let sink = CollectingSink::new();

    let events: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let listener = |event: &Progress<'_>| {
        let line = match event {
            Progress::RunStarted => "run_started".to_owned(),
            Progress::SourceStarted { source, name } => {
                format!("source_started {} {}", source, name.unwrap_or("?"))
            }
            Progress::Lines {
                source, in_source, ..
            } => format!("lines {} {}", source, in_source),
            Progress::SourceFinished {
                source,
                in_source,
                total,
                ..
            } => format!("source_finished {} {} {}", source, in_source, total),
            Progress::RunFinished { total } => format!("run_finished {}", total),
        };
        events.borrow_mut().push(line);
    };

    let engine = MapReduceBuilder::new()
        .source(&first)
        .source(&second)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .group_by(GroupBy::FirstField)
        .sink(&sink)
        .progress(&listener)
        .progress_each(2)
        .build()
        .unwrap();

    let execution = engine.run().unwrap();

    assert_eq!(execution.rows_read, 5);
    assert_eq!(execution.groups_emitted, 5);

    // Records arrive in first-seen-key order across the concatenated sources.
    let keys: Vec<String> = sink
        .records()
        .iter()
        .map(|r| r.get_str("state_county").unwrap_or("").to_owned())
        .collect();
    assert_eq!(
        keys,
        vec!["FL - Bay", "FL - Lee", "FL - Polk", "GA - Hall", "GA - Cobb"]
    );

    assert_eq!(
        events.into_inner(),
        vec![
            "run_started",
            "source_started 0 first",
            "lines 0 2",
            "source_finished 0 3 3",
            "source_started 1 second",
            "lines 1 2",
            "source_finished 1 2 5",
            "run_finished 5",
        ]
    );
}

#[test]
fn every_sink_is_closed_exactly_once_even_with_zero_rows() {
    let source = VecRowReader::new(Vec::new());

    let mut first = MockSink::new();
    first.expect_push().times(0);
    first.expect_close().times(1).returning(|| Ok(()));

    let mut second = MockSink::new();
    second.expect_push().times(0);
    second.expect_close().times(1).returning(|| Ok(()));

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .sink(&first)
        .sink(&second)
        .build()
        .unwrap();

    let execution = engine.run().unwrap();
    assert_eq!(execution.rows_read, 0);
    assert_eq!(execution.groups_emitted, 0);
}

#[test]
fn mapper_skipping_every_row_still_counts_and_closes() {
    let source = VecRowReader::new(vec![
        insurance_row("FL", "bay", "1.0", "0"),
        insurance_row("FL", "bay", "2.0", "0"),
    ]);
    let skip_all = |_row: &Row| -> RowMapperResult { Ok(None) };
    let sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&skip_all)
        .reducer(&insurance_reduce)
        .sink(&sink)
        .build()
        .unwrap();

    let execution = engine.run().unwrap();

    assert_eq!(execution.rows_read, 2);
    assert_eq!(execution.groups_emitted, 0);
    assert!(sink.records().is_empty());
    assert!(sink.is_closed());
}

#[test]
fn no_grouping_reduces_the_whole_input_to_one_accumulator() {
    let source = VecRowReader::new(vec![
        insurance_row("FL", "bay", "10.0", "0"),
        insurance_row("GA", "hall", "20.0", "0"),
        insurance_row("TX", "bexar", "30.0", "0"),
    ]);
    let sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .group_by(GroupBy::None)
        .sink(&sink)
        .build()
        .unwrap();
    engine.run().unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_i64("count"), Some(3));
    assert_eq!(records[0].get_f64("lat"), Some(20.0));
}

#[test]
fn grouping_by_key_function() {
    let source = VecRowReader::new(vec![
        insurance_row("FL", "bay", "10.0", "0"),
        insurance_row("fl", "BAY", "30.0", "0"),
        insurance_row("GA", "hall", "5.0", "0"),
    ]);
    let sink = CollectingSink::new();

    let key_fn = |record: &Record| -> GroupKey {
        GroupKey::from(
            record
                .get_str("state_county")
                .unwrap_or("")
                .to_uppercase(),
        )
    };

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .group_by(GroupBy::KeyFn(&key_fn))
        .sink(&sink)
        .build()
        .unwrap();
    engine.run().unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get_i64("count"), Some(2));
    assert_eq!(records[0].get_f64("lat"), Some(20.0));
}

#[test]
fn engine_reads_rows_from_a_csv_source() {
    let csv = "\
state,county,lat,lng
FL,bay,30.0,-85.0
FL,Bay,30.2,-85.2";

    let reader = CsvRowReaderBuilder::new().from_reader(csv.as_bytes());
    let sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&reader)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .group_by(GroupBy::Field("state_county".to_owned()))
        .sink(&sink)
        .build()
        .unwrap();

    let execution = engine.run().unwrap();

    assert_eq!(execution.rows_read, 2);
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get_str("state_county"), Some("FL - Bay"));
    assert_eq!(records[0].get_f64("lat"), Some(30.1));
}

#[test]
fn a_run_cannot_be_started_twice() {
    let source = VecRowReader::new(Vec::new());
    let sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&insurance_map)
        .reducer(&insurance_reduce)
        .sink(&sink)
        .build()
        .unwrap();

    engine.run().unwrap();
    let err = engine.run().unwrap_err();
    assert!(matches!(err, MapReduceError::Configuration(_)));
}
