#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod graph;
pub mod io;
pub mod pipeline;
pub mod runner;
pub mod tasks;

pub use crate::config::{BuildContext, Config, Profile};
pub use crate::error::BellowsError;
pub use crate::graph::TaskGraph;
pub use crate::runner::{RunReport, TaskStatus, run_goal};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the global tracing subscriber: an `EnvFilter` honoring `RUST_LOG`
/// (defaulting to `info`), plus the indicatif bridge so log lines print above
/// the progress bar instead of tearing it.
pub fn init_logging() {
    let indicatif_layer = tracing_indicatif::IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .init();
}
