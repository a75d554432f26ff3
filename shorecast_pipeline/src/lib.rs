//! Shorecast pipeline: resolve live beach-cam streams, fetch marine
//! conditions, render the cams page, and publish the result to git.
//!
//! Each stage is exposed on its own so the daemon can run them as recorded
//! steps; the `shorecast-pipeline` binary drives the same stages from the
//! command line.

pub mod config;
pub mod error;
pub mod git;
pub mod http;
pub mod marine;
pub mod render;
pub mod streams;

pub use config::SiteConfig;
pub use error::{PipelineError, Result};

/// Default site definition file name inside the work tree.
pub const SITE_FILE: &str = "shorecast.json";

/// Page template bundled with the crate; `init` writes it into a fresh
/// work tree.
pub const DEFAULT_TEMPLATE: &str = include_str!("../assets/template.html");
