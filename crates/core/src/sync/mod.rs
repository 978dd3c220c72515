//! Reconciliation domain: models, hashing, client/store contracts, engine
//! and orchestrator.

mod clients;
mod engine;
mod hash;
mod model;
mod orchestrator;
mod store;

pub use clients::*;
pub use engine::*;
pub use hash::*;
pub use model::*;
pub use orchestrator::*;
pub use store::*;

#[cfg(test)]
mod tests;
