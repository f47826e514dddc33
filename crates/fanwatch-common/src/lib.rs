//! # fanwatch-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire fanwatch workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and holds the kernel ABI values (event masks, init and
//! mark flags, wire sizes) that every other crate must agree on bit-for-bit.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
