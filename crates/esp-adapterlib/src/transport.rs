//! Contract between the bridge and the network client that talks to the
//! engine.
//!
//! The client library owns the sockets, the wire protocol and the threads
//! that deliver callbacks. The bridge only needs the operations below.
//!
//! # Callbacks
//!
//! A client created with [`EspClientHandler::publisher_start`] or
//! [`EspClientHandler::subscriber_start`] reports asynchronous events through
//! the [`ClientCallbacks`] it was created with. Callbacks run on a thread owned
//! by the client library, concurrently with whatever thread drives the
//! publisher or subscriber, so implementations must be `Send + Sync` and must
//! not assume mutual exclusion with `start`/`stop`.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use anyhow::Result as AnyResult;
use serde::Serialize;

use crate::errors::BridgeError;
use crate::event::EventBlock;
use crate::schema::Schema;

/// Opaque handle for one client connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClientId(pub u64);

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Failure class reported through [`ClientCallbacks::on_transport_error`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ClientFailure {
    ApiFailure,
    ThreadFailure,
    ServerDisconnect,
    ServerError,
}

/// Detailed failure code accompanying a [`ClientFailure`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ClientFailureCode {
    ReadFailed,
    WriteFailed,
    EncodeFailed,
    DecodeFailed,
    QueueFull,
    ClientEventStatus,
    Other,
}

impl ClientFailureCode {
    /// The connection to the engine can no longer carry data.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ReadFailed | Self::WriteFailed)
    }
}

/// Guaranteed-delivery status of a published block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum GdStatus {
    Ack,
    Nack,
    Ready,
}

/// Asynchronous notifications from a client connection.
pub trait ClientCallbacks: Send + Sync {
    /// A block of events arrived on a subscription.
    ///
    /// `schema` is the schema the client used to decode the block. An error
    /// aborts processing of the rest of the block; the client library decides
    /// what to do with it, but the connection stays open.
    fn on_event_block(&self, block: &EventBlock, schema: &Schema) -> Result<(), BridgeError>;

    /// The client hit an error. The connection may or may not be usable
    /// afterwards.
    fn on_transport_error(&self, failure: ClientFailure, code: ClientFailureCode);

    /// Delivery acknowledgement for a published block.
    fn on_delivery_status(&self, _status: GdStatus, _block_id: u64) {}
}

/// Client handler for one engine.
///
/// Calls block until the engine responds or the client library gives up;
/// timeouts are the implementation's business.
pub trait EspClientHandler: Send + Sync {
    /// Returns the metadata vector for `url` (a window url with
    /// `?get=schema`), or `None` if the engine returned nothing.
    fn query_meta(&self, url: &str) -> AnyResult<Option<Vec<String>>>;

    /// Creates a publishing client for the window at `url`. Returns `None` if
    /// the client object cannot be created.
    fn publisher_start(&self, url: &str, callbacks: Arc<dyn ClientCallbacks>) -> Option<ClientId>;

    /// Creates a subscribing client for the window at `url` (which may carry
    /// `?snapshot=`).
    fn subscriber_start(&self, url: &str, callbacks: Arc<dyn ClientCallbacks>)
        -> Option<ClientId>;

    /// Bounds the number of events the engine queues for subscribers of
    /// `url`. With `block` set the engine throttles its input once the bound
    /// is reached instead of dropping output.
    fn subscriber_max_queue_size(&self, url: &str, max_size: usize, block: bool) -> bool;

    /// Opens the connection of a client created by one of the `*_start`
    /// methods.
    fn connect(&self, client: ClientId) -> AnyResult<()>;

    /// Hands `block` to the client for transmission. Returns `false` if the
    /// client refused it.
    fn publisher_inject(&self, client: ClientId, block: &EventBlock) -> bool;

    /// Asks the engine to quiesce the project at `project_url` and waits for
    /// it to finish.
    fn quiesce_project(&self, project_url: &str, client: ClientId) -> AnyResult<()>;

    /// Closes the connection. With `flush` set, queued events are sent first.
    fn disconnect(&self, client: ClientId, flush: bool) -> AnyResult<()>;
}
