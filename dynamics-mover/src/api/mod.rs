//! Dynamics 365 Web API
//!
//! HTTP client, metadata catalog, query model and the Web API implementation
//! of the record store used by the importer and the exporter.

pub mod client;
pub mod metadata;
pub mod operations;
pub mod query;
pub mod store;

pub use client::DynamicsClient;
pub use store::DataverseStore;
