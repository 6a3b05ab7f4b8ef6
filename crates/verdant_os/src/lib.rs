#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod brochure_pipeline;
pub mod health;
pub mod submission;
