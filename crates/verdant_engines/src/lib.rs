#![forbid(unsafe_code)]

pub mod antispam;
pub mod brochure;
pub mod dispatch;
pub mod forms;
pub mod pdf;
pub mod performance;
