#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Map-Reduce for Rust

 A streaming, grouped map-reduce engine over tabular row data, paired with a
 CSV codec that feeds it. Rows arrive from one or more ordered sources, are
 transformed by a map function, aggregated per group by a reduce function,
 and the final per-group results are pushed to one or more streaming sinks.

 ## Core Concepts

 Understanding these core components will help you get started:

 - **Row:** One ordered record of field values from a tabular source, keyed
   by header name or by 0-based position for headerless input.
 - **RowReader:** A lazy, forward-only producer of rows. The CSV reader is
   one implementation; an in-memory vector of rows is another. Multiple
   sources are consumed sequentially, never interleaved.
 - **RowMapper:** Transforms one row into a mapped record, or skips it.
 - **Reducer:** Merges a mapped record into its group's running accumulator.
   Reducers should be algebraically order-independent (an exact incremental
   mean, a sum, a count) so that the final value does not depend on arrival
   order within a group.
 - **RecordSink:** A streaming consumer of final records with a
   `push`/`close` pair. The engine pushes every accumulator to every sink,
   then closes each sink exactly once, even when there was nothing to emit.
 - **MapReduce:** The engine. Pulls rows, maps, derives a group key, reduces
   into an insertion-ordered accumulator table, and drains the table to the
   sinks in first-seen-key order.

 ## Features

 The crate is modular, allowing you to enable only the features you need:

 | **Feature** | **Description**                                          |
 |-------------|----------------------------------------------------------|
 | csv         | Enables the CSV `RowReader` and the splitting CSV sink   |
 | json        | Enables a JSON Lines record sink                         |
 | logger      | Enables a logger sink, useful for debugging purposes     |
 | full        | Enables all available features                           |

 ## Getting Started

 Make sure you activated the suitable features on Cargo.toml:

```toml
[dependencies]
map-reduce-rs = { version = "<version>", features = ["<full|csv|json|logger>"] }
```

 Then, on your main.rs:

```rust
# use map_reduce_rs::{
#     core::{
#         engine::{GroupBy, MapReduceBuilder},
#         item::{ReducerResult, RowMapperResult},
#         row::{Record, Row},
#     },
#     error::MapReduceError,
#     item::memory::{CollectingSink, VecRowReader},
# };
fn main() -> Result<(), MapReduceError> {
    let headers = vec!["state".to_owned(), "county".to_owned(), "lat".to_owned()];
    let source = VecRowReader::new(vec![
        Row::from_headers(&headers, vec!["FL".into(), "bay".into(), "30.0".into()]),
        Row::from_headers(&headers, vec!["FL".into(), "Bay".into(), "30.2".into()]),
    ]);

    let map = |row: &Row| -> RowMapperResult {
        let county = row.get("county").unwrap_or_default().to_lowercase();
        let mut record = Record::new();
        record.insert(
            "state_county",
            format!("{} - {}", row.get("state").unwrap_or_default(), county),
        );
        record.insert("count", 1i64);
        record.insert("lat", row.get("lat").unwrap_or("0").parse::<f64>().unwrap_or(0.0));
        Ok(Some(record))
    };

    // Exact incremental mean: order-independent within a group.
    let reduce = |new: &Record, carry: Option<&Record>| -> ReducerResult {
        let Some(carry) = carry else {
            let mut seed = new.clone();
            seed.insert("count", 1i64);
            return Ok(seed);
        };
        let count = carry.get_i64("count").unwrap_or(0) + 1;
        let lat = (carry.get_f64("lat").unwrap_or(0.0) * (count - 1) as f64
            + new.get_f64("lat").unwrap_or(0.0))
            / count as f64;
        let mut merged = carry.clone();
        merged.insert("count", count);
        merged.insert("lat", lat);
        Ok(merged)
    };

    let sink = CollectingSink::new();

    let engine = MapReduceBuilder::new()
        .source(&source)
        .mapper(&map)
        .reducer(&reduce)
        .group_by(GroupBy::FirstField)
        .sink(&sink)
        .build()?;

    let execution = engine.run()?;

    assert_eq!(execution.rows_read, 2);
    assert_eq!(execution.groups_emitted, 1);
    assert!(sink.is_closed());
    assert_eq!(sink.records()[0].get_i64("count"), Some(2));

    Ok(())
}
```

 ## License

 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.

 */

/// Core module for the map-reduce engine and its abstractions
pub mod core;

/// Error types for map-reduce operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of row readers / record sinks (for example: csv reader and writer)
pub mod item;
