//! `hiregate-core`: pure building blocks shared by the gate.
//!
//! This crate contains **no I/O** and no HTTP types: path templates, the
//! authenticated subject identifier, and their error model.

pub mod error;
pub mod pattern;
pub mod subject;

pub use error::{CoreError, CoreResult};
pub use pattern::{PathTemplate, Segment};
pub use subject::Subject;
