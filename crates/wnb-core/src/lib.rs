//! Core of the world news bot: domain types, configuration, feed parsing,
//! the summarization pipeline, Telegram formatting/delivery and the scheduler.
//!
//! Storage, the LLM endpoint and Telegram live behind ports (traits)
//! implemented in adapter crates.

pub mod aggregator;
pub mod app;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod feeds;
pub mod formatting;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod scheduler;
pub mod setup;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
