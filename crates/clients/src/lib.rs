//! HTTP clients for the two external systems: Rubic (source, read-only)
//! and Tripletex (target, one client per environment).

pub mod rubic;
pub mod tripletex;

pub use rubic::RubicClient;
pub use tripletex::{TripletexClient, TripletexClientFactory};
