use std::borrow::Cow;
use std::str::Utf8Error;

use anyhow::Error as AnyError;
use esp_types::{AddressError, ConfigError, DetailedError, FieldType};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use thiserror::Error;

/// Error classes distinguished by callers.
///
/// Only [`ErrorKind::EngineDown`] is meant to be retried, and only after the
/// engine and the bridge have been restarted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Invalid address or options. The endpoint never starts.
    Configuration,
    /// Schema fetch, client creation, connect or quiesce failures.
    Connectivity,
    /// The engine health flag has been raised.
    EngineDown,
    /// A record or event that does not fit the window schema.
    StructuralData,
    /// The downstream processor rejected an event.
    Downstream,
}

/// Failure to parse a schema descriptor returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema descriptor is empty")]
    Empty,

    #[error("field {position} ('{entry}') is not of the form name:type")]
    MalformedField { position: usize, entry: String },

    #[error("field {position} has an empty name")]
    EmptyName { position: usize },

    #[error("field {position}: {error}")]
    UnknownType { position: usize, error: String },

    #[error("field name '{name}' appears more than once")]
    DuplicateName { name: String },
}

/// Failure to convert between delimited text and engine events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("field count mismatch: data has {actual} fields, schema defines {expected}")]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("event text '{text}' is missing the opcode prefix")]
    MissingPrefix { text: String },

    #[error("unknown opcode '{opcode}'")]
    UnknownOpcode { opcode: String },

    #[error("unknown event flags '{flags}'")]
    UnknownFlags { flags: String },

    #[error("invalid value '{value}' for field {index} ('{name}') of type {field_type}")]
    InvalidValue {
        index: usize,
        name: String,
        field_type: FieldType,
        value: String,
    },

    #[error("key field {index} ('{name}') is empty")]
    EmptyKey { index: usize, name: String },
}

impl CodecError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::FieldCountMismatch { .. } => "FieldCountMismatch",
            Self::MissingPrefix { .. } => "MissingPrefix",
            Self::UnknownOpcode { .. } => "UnknownOpcode",
            Self::UnknownFlags { .. } => "UnknownFlags",
            Self::InvalidValue { .. } => "InvalidValue",
            Self::EmptyKey { .. } => "EmptyKey",
        }
    }
}

/// Every error raised by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    InvalidOptions(#[from] ConfigError),

    #[error("mode to insert data is not set for '{uri}'; use mode=insert|upsert|insertAddId|delete|dynamic")]
    ModeNotSet { uri: String },

    #[error("problem fetching metadata from '{address}': {reason}")]
    SchemaUnavailable { address: String, reason: String },

    #[error("problem creating schema for '{address}': {error}")]
    InvalidSchema {
        address: String,
        #[source]
        error: SchemaError,
    },

    #[error("client object creation for connection to '{address}' not possible")]
    ClientCreation { address: String },

    #[error("can't connect to ESP engine at '{address}': {error}")]
    Connect {
        address: String,
        #[source]
        error: AnyError,
    },

    #[error("failed to set max queue size {max_queue_size} for subscriber of '{address}'")]
    QueueBound {
        address: String,
        max_queue_size: usize,
    },

    #[error("endpoint '{address}' has not been started")]
    NotStarted { address: String },

    #[error("seems that the ESP engine is down; check/restart the engine and then restart the adapter")]
    ConnectionLost,

    #[error("problem quiescing project '{project}' after publishing to '{address}': {error}")]
    Quiesce {
        project: String,
        address: String,
        #[source]
        error: AnyError,
    },

    #[error("input for '{address}' is not valid UTF-8: {error}")]
    InvalidEncoding {
        address: String,
        #[source]
        error: Utf8Error,
    },

    #[error("error creating event from line {line_number} ('{line}') for '{address}': {error}")]
    Encode {
        address: String,
        line_number: usize,
        line: String,
        #[source]
        error: CodecError,
    },

    #[error("problem decoding event {event_index} of block received from '{address}': {error}")]
    Decode {
        address: String,
        event_index: usize,
        #[source]
        error: CodecError,
    },

    #[error("error processing event {event_index} received from '{address}': {error}")]
    Downstream {
        address: String,
        event_index: usize,
        #[source]
        error: AnyError,
    },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) | Self::InvalidOptions(_) | Self::ModeNotSet { .. } => {
                ErrorKind::Configuration
            }
            Self::SchemaUnavailable { .. }
            | Self::InvalidSchema { .. }
            | Self::ClientCreation { .. }
            | Self::Connect { .. }
            | Self::QueueBound { .. }
            | Self::NotStarted { .. }
            | Self::Quiesce { .. } => ErrorKind::Connectivity,
            Self::ConnectionLost => ErrorKind::EngineDown,
            Self::InvalidEncoding { .. } | Self::Encode { .. } | Self::Decode { .. } => {
                ErrorKind::StructuralData
            }
            Self::Downstream { .. } => ErrorKind::Downstream,
        }
    }

    /// Returns the codec error behind an encode or decode failure.
    pub fn codec_error(&self) -> Option<&CodecError> {
        match self {
            Self::Encode { error, .. } | Self::Decode { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl DetailedError for BridgeError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::InvalidAddress(_) => Cow::from("InvalidAddress"),
            Self::InvalidOptions(_) => Cow::from("InvalidOptions"),
            Self::ModeNotSet { .. } => Cow::from("ModeNotSet"),
            Self::SchemaUnavailable { .. } => Cow::from("SchemaUnavailable"),
            Self::InvalidSchema { .. } => Cow::from("InvalidSchema"),
            Self::ClientCreation { .. } => Cow::from("ClientCreation"),
            Self::Connect { .. } => Cow::from("Connect"),
            Self::QueueBound { .. } => Cow::from("QueueBound"),
            Self::NotStarted { .. } => Cow::from("NotStarted"),
            Self::ConnectionLost => Cow::from("ConnectionLost"),
            Self::Quiesce { .. } => Cow::from("Quiesce"),
            Self::InvalidEncoding { .. } => Cow::from("InvalidEncoding"),
            Self::Encode { error, .. } | Self::Decode { error, .. } => {
                Cow::from(error.error_code())
            }
            Self::Downstream { .. } => Cow::from("Downstream"),
        }
    }
}

impl Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_struct("BridgeError", 3)?;
        ser.serialize_field("error_code", &self.error_code())?;
        ser.serialize_field("kind", &self.kind())?;
        ser.serialize_field("message", &self.to_string())?;
        ser.end()
    }
}
