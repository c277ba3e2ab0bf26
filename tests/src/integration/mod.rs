//! Cross-module admission flows.

pub mod fixtures;
pub mod flows;
