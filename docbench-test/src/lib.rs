//! Test utilities for docbench.
//!
//! This crate provides utilities to facilitate testing of the benchmark driver and its store
//! backends. See the modules for all available utilities.

pub mod counting;
pub mod tracing;
