#![forbid(unsafe_code)]

pub mod brochure;
pub mod common;
pub mod config;
pub mod strategy;
pub mod submission;
pub mod ticket;

pub use common::{
    ContractViolation, CorrelationId, ReasonCodeId, SchemaVersion, UtcSeconds, Validate,
};
