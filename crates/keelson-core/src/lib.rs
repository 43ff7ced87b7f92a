//! # keelson-core
//!
//! Core shared library for keelson nodes and tools.
//! Provides async connections and listeners, leader discovery with
//! backoff, server address stores, and the request/response client.

pub mod client;
pub mod connector;
pub mod net;
pub mod retry;
pub mod store;

pub use client::Client;
pub use connector::{Config, Connector};
pub use net::{tcp_dial, Conn, DialFn, Listener, TcpNodeListener};
pub use retry::RetryStrategy;
pub use store::{InMemoryServerStore, ServerStore, YamlServerStore};
