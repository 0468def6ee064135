//! Implementations of [`EspClientHandler`](esp_adapterlib::EspClientHandler).
//!
//! A client handler for a real engine lives outside this crate and wraps the
//! engine's client library.

mod loopback;

pub use loopback::LoopbackEngine;
