#![doc = include_str!("../README.md")]

//! The galago sampling engine.
//!
//! One [`sampler::Sampler`] owns all run state. Each epoch seeds a
//! fresh region of the model space through MaxSMT, probes one-bit
//! mutations of the seed against the solver, then recombines validated
//! mutations into new candidates that are verified by direct
//! evaluation, never by solving.

pub mod config;
mod output;
pub mod sampler;
mod seed;
pub mod stats;

pub use config::{SamplerConfig, Strategy};
pub use galago_smt::SamplerError;
pub use sampler::{Sampler, StopReason};
pub use stats::Stats;
