//! The agentmail node service (C6): inbound HTTP surface, identity
//! persistence, and the background registration/pickup/outbox-drain loops
//! for one node identity. Built as a thin lib behind the `agentmail-node`
//! binary so its handlers and loop ticks are directly testable.

pub mod config;
pub mod http;
pub mod identity_store;
pub mod loops;
