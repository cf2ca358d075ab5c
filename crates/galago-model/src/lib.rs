#![doc = include_str!("../README.md")]

//! Canonical model representation for the galago sampler.
//!
//! This crate defines the supported sort universe, the tagged value
//! representation of satisfying assignments, the canonical byte codec
//! used for deduplication, and the bitwise combination law that fuses
//! two mutations of a seed model into a new candidate.

pub mod codec;
pub mod combine;
pub mod error;
pub mod sorts;
pub mod value;

pub use codec::{decode, encode};
pub use error::ModelError;
pub use sorts::{Declaration, Sort};
pub use value::{BvValue, Model, Value};
