pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::pipelines::SubstancePipeline;
pub use config::{cli::LocalStorage, toml_config::BuildConfig};
pub use crate::core::engine::BuildEngine;
pub use crate::core::normalize::{canonical_name, Normalizer};
pub use domain::model::{BuildArtifact, SexCount};
pub use utils::error::{BuildError, Result};
