//! Core pipeline orchestration and domain logic for archdoc.
//!
//! Normalizes project requirements, retrieves governance knowledge, and runs
//! each document section through a write → review → retry loop before
//! assembling the final Technical Architecture Document (`generate_document`).

pub mod assembler;
pub mod naming;
pub mod normalizer;
pub mod pipeline;
pub mod prompts;
pub mod qualifier;
pub mod retrieval;
pub mod reviewer;
pub mod schema;
pub mod services;
pub mod writer;

#[cfg(test)]
pub(crate) mod fakes;
