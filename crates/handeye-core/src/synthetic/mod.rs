//! Deterministic synthetic data generation helpers.
//!
//! Small building blocks used by tests and demos of the pipeline crates:
//! - deterministic pseudo-random pose perturbations ([`noise`]),
//! - simple station paths for a robot flange ([`motion`]).
//!
//! Everything here is seeded explicitly so datasets are stable across
//! platforms and runs.

pub mod motion;
pub mod noise;
