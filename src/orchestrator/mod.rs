//! Simulation run orchestration.
//!
//! This module owns the run lifecycle (single-flight start, brew-step consumption,
//! error termination), the shared report feed that presentation layers render,
//! and post-run export of that feed. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
pub mod export;
pub mod feed;
pub mod format;

pub(crate) use controller::{run_controller, RunController, UiCommand};
pub(crate) use feed::ReportFeed;
