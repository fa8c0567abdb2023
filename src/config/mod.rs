//! Configuration models for the scheduler and the network dispatcher.

pub mod settings;

pub use settings::{
    CoreConfig, DispatcherConfig, SchedulerConfig, ENV_MAX_CONCURRENT_REQUESTS, ENV_MAX_THREADS,
    ENV_THREAD_NAME_PREFIX, ENV_THREAD_STACK_SIZE,
};
