#[cfg(feature = "logger")]
/// This module provides a logger sink implementation for debugging purposes.
pub mod logger;

#[cfg(feature = "csv")]
/// This module provides the CSV row reader and record writer.
pub mod csv;

#[cfg(feature = "json")]
/// This module provides a JSON Lines record writer.
pub mod json;

/// This module provides an in-memory row source and a collecting sink.
pub mod memory;
