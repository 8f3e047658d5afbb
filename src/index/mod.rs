//! Vector index provider integration.

mod client;
mod types;

pub use client::VectorIndexClient;
pub use types::{IndexError, Passage, VectorRecord};
