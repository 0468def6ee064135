//! Public types shared by the ESP bridge crates: window addresses, endpoint
//! configuration, opcodes and field types.

pub mod address;
pub mod config;
pub mod error;
pub mod field;
pub mod opcode;

pub use address::{split_options, AddressError, EspAddress, ESP_SCHEME};
pub use config::{ConfigError, EspEndpointConfig, InsertMode, DEFAULT_MAX_QUEUE_SIZE};
pub use error::DetailedError;
pub use field::FieldType;
pub use opcode::{EventFlags, Opcode};
