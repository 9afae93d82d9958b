//! koan-util - Shared utilities for the Koan interpreter.
//!
//! This crate collects the small, dependency-free pieces every other
//! crate leans on:
//!
//! - [`bits`] - popcount/top-bit helpers and one-bit word tagging
//! - [`sloc`] - the packed 64-bit source location
//! - [`hash`] - the 64-bit mix hash used by the environment index

pub mod bits;
pub mod hash;
pub mod sloc;

pub use hash::memhash;
pub use sloc::Sloc;
