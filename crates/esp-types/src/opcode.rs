//! Event opcodes and flags understood by the engine.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tells the engine how to apply an event to a window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Insert,
    Update,
    Delete,
    Upsert,
    /// Delete that does not fail when the key is absent.
    #[serde(rename = "safedelete")]
    SafeDelete,
}

impl Opcode {
    /// Single-letter code used in delimited event text.
    pub fn code(&self) -> char {
        match self {
            Self::Insert => 'i',
            Self::Update => 'u',
            Self::Delete => 'd',
            Self::Upsert => 'p',
            Self::SafeDelete => 's',
        }
    }

    /// Parses a single-letter code, ignoring case.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "i" => Some(Self::Insert),
            "u" => Some(Self::Update),
            "d" => Some(Self::Delete),
            "p" => Some(Self::Upsert),
            "s" => Some(Self::SafeDelete),
            _ => None,
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Upsert => "upsert",
            Self::SafeDelete => "safedelete",
        };
        f.write_str(name)
    }
}

/// Per-event flags.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventFlags {
    #[default]
    Normal,
    /// Update carrying only some of the non-key fields.
    Partial,
}

impl EventFlags {
    pub fn code(&self) -> char {
        match self {
            Self::Normal => 'n',
            Self::Partial => 'p',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "n" => Some(Self::Normal),
            "p" => Some(Self::Partial),
            _ => None,
        }
    }
}
