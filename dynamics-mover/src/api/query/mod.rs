//! OData query model
//!
//! Queries are plain data: the Web API client renders them into URLs, the
//! in-memory store used by tests evaluates the same filter trees directly.

mod filters;
mod query;

pub use filters::{Filter, FilterValue};
pub use query::Query;
