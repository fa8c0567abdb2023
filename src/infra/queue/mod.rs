//! Queue backends.

pub mod memory;

pub use memory::{ByPriority, Comparator, Prioritized, PriorityQueue};
