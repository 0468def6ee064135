pub mod errors;
pub mod event;
pub mod pipeline;
pub mod schema;
pub mod transport;

pub use errors::{BridgeError, CodecError, ErrorKind, SchemaError};
pub use event::{DataItem, EspEvent, EventBlock};
pub use pipeline::{Exchange, Processor};
pub use schema::{FieldDescriptor, Schema};
pub use transport::{
    ClientCallbacks, ClientFailure, ClientFailureCode, ClientId, EspClientHandler, GdStatus,
};
