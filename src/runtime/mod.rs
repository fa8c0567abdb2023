//! Host platform adapters.

pub mod platform;

pub use platform::{FixedCeiling, HostCeiling, ThreadCeiling};
