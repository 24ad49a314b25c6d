//! Random workload generation for the repkv engine.

pub mod generator;

pub use generator::{generate_mult_workloads, generate_single_workload, Workload, WorkloadParams};
