//! Dynamics 365 write operations
//!
//! Operations are plain data; `DynamicsClient::execute` sends them.

pub mod operation;

pub use operation::{Operation, OperationResult};
