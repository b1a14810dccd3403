//! Stylebook - asset-aware build pipeline for stylesheet libraries
//!
//! This library provides functionality to:
//! - Compile stylesheet entries to content-addressed output paths
//! - Generate a styleguide whose configuration points at the emitted files
//! - Bundle scripts and copy media with the same naming rules
//! - Rebuild affected tasks on file changes and live-reload a preview server

pub mod build;
pub mod cli;
pub mod config;
pub mod logging;
pub mod serve;
pub mod stages;
pub mod tools;
pub mod watch;
