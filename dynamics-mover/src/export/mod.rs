//! Export of records from a source environment

mod exporter;

pub use exporter::{ExportOptions, Exporter};
