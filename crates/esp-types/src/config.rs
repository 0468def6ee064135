//! Per-endpoint configuration.
//!
//! Options are usually given as the query part of an endpoint uri:
//!
//! ```text
//! dfESP://localhost:55555/project/cq/window?mode=insertAddId&quiesce=true
//! ```
//!
//! but the same structure can be deserialized from YAML.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::opcode::Opcode;

/// Default bound on the number of events the engine buffers for one
/// subscriber before it throttles its input.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 128;

/// How published lines are applied to the target window.
///
/// Every variant maps to an opcode prefix placed in front of each line. The
/// prefix is rendered with the configured field delimiter, so with the default
/// delimiter `Insert` produces `i,n,`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum InsertMode {
    #[serde(rename = "insert")]
    Insert,
    #[serde(rename = "upsert")]
    Upsert,
    /// Insert, prepending a freshly generated UUID as the first field.
    #[serde(rename = "insertAddId")]
    InsertAddId,
    #[serde(rename = "delete")]
    Delete,
    /// Lines already carry their own opcode and flags.
    #[serde(rename = "dynamic")]
    Dynamic,
}

impl InsertMode {
    /// Opcode applied to every line, or `None` for [`InsertMode::Dynamic`].
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Self::Insert | Self::InsertAddId => Some(Opcode::Insert),
            Self::Upsert => Some(Opcode::Upsert),
            Self::Delete => Some(Opcode::Delete),
            Self::Dynamic => None,
        }
    }

    /// Prefix for the default `,` delimiter, e.g. `"p,n,"` for upserts.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Insert | Self::InsertAddId => "i,n,",
            Self::Upsert => "p,n,",
            Self::Delete => "d,n,",
            Self::Dynamic => "",
        }
    }

    /// Whether each line gets a generated identifier as its leading field.
    pub fn adds_id(&self) -> bool {
        matches!(self, Self::InsertAddId)
    }
}

impl Display for InsertMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::InsertAddId => "insertAddId",
            Self::Delete => "delete",
            Self::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

const fn default_delimiter() -> char {
    ','
}

const fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

const fn default_snapshot() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("error parsing endpoint options '{options}': {error}")]
    InvalidOptions { options: String, error: String },

    #[error("field delimiter must be an ASCII character, found '{delimiter}'")]
    InvalidDelimiter { delimiter: char },

    #[error("'maxQueueSize' must be greater than zero")]
    InvalidQueueSize,
}

/// Options recognized by an ESP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EspEndpointConfig {
    /// Publisher only, mandatory for publishing.
    #[serde(default)]
    pub mode: Option<InsertMode>,

    /// Subscriber only. When set, only events carrying this opcode are
    /// forwarded downstream.
    #[serde(default)]
    pub subscribe_mode: Option<Opcode>,

    /// Publisher only. Quiesce the project after publishing a block; see
    /// `EspPublisher::process` for the exact rule.
    #[serde(default)]
    pub quiesce: bool,

    /// Field delimiter (default `','`).
    ///
    /// This must be an ASCII character.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Subscriber only. Maximum number of events the engine queues for this
    /// subscriber before throttling its input.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Subscriber only. Request the current window contents on subscribe.
    #[serde(default = "default_snapshot")]
    pub snapshot: bool,
}

impl Default for EspEndpointConfig {
    fn default() -> Self {
        Self {
            mode: None,
            subscribe_mode: None,
            quiesce: false,
            delimiter: default_delimiter(),
            max_queue_size: default_max_queue_size(),
            snapshot: default_snapshot(),
        }
    }
}

impl EspEndpointConfig {
    /// Parses options from the query part of an endpoint uri.
    pub fn from_query(options: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_urlencoded::from_str(options).map_err(|e| ConfigError::InvalidOptions {
                options: options.to_string(),
                error: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter {
                delimiter: self.delimiter,
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize);
        }
        Ok(())
    }
}
