//! Service binary wiring: configuration, and the component graph tying
//! transport, discovery, and storage together for local soak testing.

mod config;
mod service;

pub use config::{DiscoverySettings, ScaleServiceConfig, ServiceSettings, StabilitySettings, TransportSettings};
pub use service::ScaleService;
