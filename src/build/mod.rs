//! Build pipeline module for stylebook
//!
//! Compiles stylesheets, generates the styleguide site and copies scripts and
//! media into the output directory, in dependency order.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Planning**: map each artifact to an output path ([`OutputPlanner`])
//! - **Graph**: tasks and their dependencies, validated once ([`PipelineGraph`])
//! - **Binding**: feed finalized artifact paths into downstream configuration
//!   ([`AssetBindingResolver`])
//! - **Execution**: run a pass and collect per-task results ([`Pipeline`])
//!
//! # Example
//!
//! ```ignore
//! use stylebook::build::{BuildContext, BuildMode, PassKind};
//! use stylebook::config::load_project;
//!
//! let loaded = load_project(None)?;
//! let context = BuildContext::new(loaded.config, loaded.project_root, BuildMode::Production)?;
//! let mut pipeline = stylebook::stages::assemble(Arc::new(context), &toolchain)?;
//!
//! let report = pipeline.run_all(PassKind::Full).await?;
//! println!("{}", report.summary());
//! ```

pub mod artifact;
pub mod binding;
pub mod context;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod planner;
pub mod result;
pub mod routing;
pub mod stage;

pub use artifact::*;
pub use binding::*;
pub use context::*;
pub use error::*;
pub use graph::*;
pub use pipeline::*;
pub use planner::*;
pub use result::*;
pub use routing::*;
pub use stage::*;
