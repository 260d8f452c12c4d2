//! upwatch - endpoint uptime poller
//!
//! Periodically probes every stored check, records the up/down outcome,
//! alerts owners on state changes and rotates the per-check logs.

pub mod clock;
pub mod config;
pub mod monitoring;
pub mod notify;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
