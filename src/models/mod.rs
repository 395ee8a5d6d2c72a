//! Data models for the asset shim
//!
//! Classification vocabulary, rule data and form submission records.

pub mod classification;
pub mod rules;
pub mod submission;

pub use classification::*;
pub use rules::*;
pub use submission::*;
