//! # navcore scheduler
//!
//! Cooperative work scheduling for a navigation engine.
//!
//! The crate runs background work (tile decoding, search, route requests) on a
//! bounded pool of OS threads in priority order, and throttles network requests
//! so that no more than a fixed number reach the map server at once.
//!
//! ## Key Features
//!
//! - **Priority queue**: binary heap with a pluggable comparator, FIFO among equals
//! - **Work scheduler**: lazily grown worker threads capped by configuration and
//!   by the platform thread ceiling, blocking and delayed submission, and a
//!   one-way shutdown that hands back unexecuted work
//! - **Network dispatcher**: admission control over the scheduler; requests
//!   that cannot be admitted are held and released in priority order
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use navcore_scheduler::builders::build_core;
//! use navcore_scheduler::config::CoreConfig;
//! use navcore_scheduler::core::{sink_fn, NetworkRequest, Priority};
//! use navcore_scheduler::infra::ScriptedTransport;
//! use navcore_scheduler::runtime::HostCeiling;
//!
//! let services = build_core(&CoreConfig::default(), &HostCeiling, Arc::new(ScriptedTransport::new()))?;
//! services.dispatcher.submit(
//!     NetworkRequest::get("maps.example.net", "/tiles/12/2048/1361").with_priority(Priority::HIGH),
//!     sink_fn(|result| println!("{:?}", result.map(|body| body.len()))),
//! );
//! services.shutdown()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Work items, the scheduler, and the network dispatcher.
pub mod core;
/// Configuration models for the scheduler and dispatcher.
pub mod config;
/// Builders to construct core services from configuration.
pub mod builders;
/// Infrastructure adapters for queues and transports.
pub mod infra;
/// Platform adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;
