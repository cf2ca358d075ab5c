#![doc = include_str!("../README.md")]

//! Z3 integration for the galago sampler.
//!
//! Everything that touches the solver lives here: parsing input
//! formulas, the bit-blasting pipeline, the start-up walk that
//! discovers and classifies declared symbols, the paired MaxSMT/plain
//! solver, extraction of canonical models, and the direct evaluation of
//! candidate models used by the combination engine.

pub mod ast;
pub mod classify;
pub mod error;
pub mod eval;
pub mod extract;
pub mod loader;
pub mod solver;

pub use error::SamplerError;
