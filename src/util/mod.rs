//! Utility functions
//!
//! Helpers - randomization, local ports, child processes, ordered fallbacks.

pub mod cascade;
pub mod net;
pub mod process;
pub mod rand;

pub use cascade::Cascade;
