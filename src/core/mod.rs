pub mod aggregators;
pub mod allow_list;
pub mod engine;
pub mod normalize;
pub mod resolver;
pub mod table;

pub use crate::domain::model::{BuildArtifact, SexCount};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
