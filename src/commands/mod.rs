pub mod janitor;
pub mod organize_pipeline;
