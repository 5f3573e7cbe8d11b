//! Guardian Storage - Durable column storage backed by a JSON file.
//!
//! The governance engine keeps its working set in memory and writes every
//! mutation through to this store; on startup it rebuilds from a scan.

pub mod db;
pub mod error;

pub use db::{Column, Database, WriteBatch};
pub use error::StorageError;
