//! Offline-tolerant client for a hadith content service.
//!
//! [`client::ResilientClient`] is the entry point: every read goes through a
//! persistent TTL cache, bounded retries and a failure-counting health
//! monitor, and falls back to cached, embedded or synthesized data instead
//! of failing.

pub mod api;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod fallback;
pub mod health;
pub mod logging;
pub mod notify;
pub mod retry;

#[cfg(test)]
mod testing;

pub use client::ResilientClient;
