pub mod substance_pipeline;

pub use substance_pipeline::SubstancePipeline;
