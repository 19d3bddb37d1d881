//! genie-relay - bridges chat front ends to the Genie conversational query API.
//!
//! A question flows through admission control (rate limit and duplicate
//! suppression), is serialized per user, resolved by the query orchestrator
//! and rendered into chunked, size-bounded markdown.

pub mod browse;
pub mod build_info;
pub mod config;
pub mod genie;
pub mod orchestrator;
pub mod render;
pub mod retry;
pub mod service;
pub mod session;
