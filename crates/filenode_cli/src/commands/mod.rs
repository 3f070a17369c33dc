//! CLI command implementations.

pub mod plan;
pub mod scan;
pub mod serve;
pub mod sync;
