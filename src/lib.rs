//! multisuite library crate.
//!
//! Two independent tools for running many compatibility test classes
//! against few deployments:
//!
//! - [`aggregate`] merges per-class deployment units into one aggregate
//!   artifact, with explicit conflict and scan policies;
//! - [`variant`] repeats an operation once per variant of a shared context
//!   (e.g. per namespace) and aggregates the failures.
//!
//! They share only the failure-surfacing rule in [`error`]. The
//! `multisuite` binary wires the aggregator to a directory scan, a class
//! manifest, and a configuration file.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod telemetry;
pub mod variant;
