//! Deterministic stand-ins for the backend, for this crate's tests and for
//! downstream crates exercising the controller without a network.

pub mod fixtures;
mod scripted;

pub use scripted::{Endpoint, GatewayCall, Responder, ScriptedGateway};
