//! Byte-transparent transport layer.
//!
//! A small trait abstracting the physical link, a concrete TCP
//! implementation, and an in-memory mock used by tests. The link exposes a
//! `data received` event and a `state changed` event, realized with a
//! `broadcast` channel for data and a `watch` channel for state so late
//! subscribers immediately see the current connection state rather than a
//! replayed history.

mod mock;
mod tcp;
mod traits;

pub use mock::MockTransport;
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use traits::{ConnectionState, DataEvent, Transport};
