//! Batch inputs and outputs of the `escrowd` binary.

pub mod csv;
pub mod json;
