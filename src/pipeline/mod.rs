//! The asset pipeline: planning, Stage execution and Task orchestration.
//!
//! ```text
//! TaskGraph::build ──▶ planner::plan (per group) ──▶ StageInvocation[]
//!        │
//!        ▼
//! task::run: Idle → Cleaning → Processing ══▶ Finalizing → Done
//!                                  │ JoinSet     │ JoinSet
//!                                  ▼             ▼
//!                              stage::run    stage::run (reads Manifest)
//! ```

pub mod clean;
pub mod error;
pub mod manifest;
pub mod planner;
pub mod stage;
pub mod task;

pub use task::{TaskGraph, TaskReport};
