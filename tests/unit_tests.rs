//! Unit tests for individual components, compiled as one test binary.

mod unit;
