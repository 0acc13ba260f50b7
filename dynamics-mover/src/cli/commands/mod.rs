//! Export and import command handlers

pub mod export;
pub mod import;
