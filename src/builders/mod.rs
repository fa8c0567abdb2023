//! Builders to construct scheduler components from configuration.

pub mod core_builder;

pub use core_builder::{build_core, CoreServices};
