//! IEC 61850 SCL GOOSE / sampled value subscription engine.
//!
//! [`scl`] holds the document model and its edit vocabulary, [`subscription`]
//! the matching, indexing and mutation logic built on it.

pub mod batch;
pub mod cfg;
pub mod comdata;
pub mod scl;
pub mod subscription;
pub mod utils;

pub use anyhow::Result;
