//! Career insights: profile updates backed by a shared, AI-generated
//! industry insight cache.

pub mod config;
pub mod error;
pub mod identity;
pub mod insights;
pub mod llm;
pub mod profile;
pub mod refresh;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
