//! Runtime state

pub mod model;

pub use model::Session;
