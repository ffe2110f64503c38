//! ferry core - shared abstractions for the extraction pipeline
//!
//! This crate provides the fundamental types every other ferry crate
//! depends on:
//!
//! - `Connection` - trait implemented by each database driver
//! - `DataTable` - the schema-carrying row buffer exchanged between stages
//! - `Extraction`, `Origin`, `Destination` - the job descriptors
//! - `DialectKind` - the closed set of supported database engines
//! - `FerryError` - the error taxonomy shared by all layers

mod connection;
mod data_table;
mod dialect;
mod error;
mod model;
mod type_mapping;
mod types;

pub use connection::*;
pub use data_table::*;
pub use dialect::*;
pub use error::*;
pub use model::*;
pub use type_mapping::*;
pub use types::*;
