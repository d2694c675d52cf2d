//! The agentmail relay service (C7): a cryptographically blind name
//! registry and per-recipient envelope inbox, served over HTTP (spec.md
//! §4.7, §6). Built as a thin lib behind the `agentmail-relay` binary so
//! its handlers are directly testable.

pub mod http;
pub mod queue;
pub mod registry;
