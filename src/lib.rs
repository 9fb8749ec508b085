//! Fleet Chat Gateway - streaming chat front-end for a hosted AI agent.
//!
//! Accepts a conversation transcript over HTTP, forwards the latest user
//! message to a hosted agent that works through asynchronous runs, and relays
//! the answer back to the caller as Server-Sent Events while the run is still
//! in progress.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
