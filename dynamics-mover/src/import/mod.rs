//! Import of record batches into a target environment

pub mod dependency;
pub mod engine;
pub mod options;
pub mod prepare;
pub mod progress;
pub mod sink;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use engine::{ImportError, ImportReport, RecordImporter};
pub use options::ImportOptions;
pub use prepare::{WebsiteMapping, remap_websites};
pub use progress::EntityProgress;
pub use sink::{LogSink, Phase, ProgressSink};
