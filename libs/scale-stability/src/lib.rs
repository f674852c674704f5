//! Signal stability monitoring.
//!
//! Maintains a rolling window of recent byte samples, classifies the
//! current link/signal quality, and exposes a pure `filter` used both by
//! the Discovery Engine's baseline capture and the runtime ingestion path.
//!
//! A bounded history behind a lock, a periodic background analysis tick,
//! and a published report — the window and `filter` operation are kept
//! synchronous (`parking_lot` rather than `tokio::sync`) since `filter`
//! must be a pure, synchronous function of its input.

mod analysis;
mod config;
mod monitor;

pub use config::StabilityMonitorConfig;
pub use monitor::StabilityMonitor;
