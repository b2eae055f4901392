//! Utility modules shared by the pipeline.

pub mod glob;
pub mod hash;
