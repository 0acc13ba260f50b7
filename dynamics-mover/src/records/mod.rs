//! In-memory record model shared by export, file persistence and import

mod record;
mod value;

pub use record::*;
pub use value::*;
