//! Shared fixtures for the workspace benchmarks.

pub mod bench_support;
