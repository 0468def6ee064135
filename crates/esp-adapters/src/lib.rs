//! Adapters that bridge a message pipeline with an event stream processing
//! (ESP) engine.
//!
//! An [`EspEndpoint`] identifies one stream window and carries its options and
//! counters. It creates:
//!
//! - [`EspPublisher`]s, which turn batches of delimited lines into event
//!   blocks and publish them to the window, and
//! - [`EspSubscriber`]s, which receive event blocks from the window and hand
//!   one [`Exchange`] per event to a downstream [`Processor`].
//!
//! Endpoints are created by an [`EspComponent`], which validates the endpoint
//! uri and shares one [`EngineHealth`] flag between every endpoint it creates.
//! Once any subscriber observes a read or write failure on its connection the
//! flag is raised and all further publish attempts fail with
//! [`BridgeError::ConnectionLost`].
//!
//! The network client is abstracted by [`EspClientHandler`];
//! [`transport::LoopbackEngine`] is an in-memory implementation.

pub mod codec;
pub mod component;
pub mod endpoint;
pub mod health;
pub mod metrics;
pub mod mode;
pub mod publisher;
pub mod subscriber;
pub mod transport;

#[cfg(test)]
mod test;

pub use component::EspComponent;
pub use endpoint::EspEndpoint;
pub use health::EngineHealth;
pub use metrics::{EndpointMetrics, EndpointStatus, MetricsSnapshot};
pub use publisher::EspPublisher;
pub use subscriber::{EspSubscriber, SubscriberState};

pub use esp_adapterlib::{
    BridgeError, ClientCallbacks, ClientFailure, ClientFailureCode, ClientId, CodecError,
    DataItem, EspClientHandler, EspEvent, ErrorKind, EventBlock, Exchange, Processor, Schema,
};
pub use esp_types::{EspAddress, EspEndpointConfig, InsertMode, Opcode};
