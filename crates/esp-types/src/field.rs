use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Engine-side type of a window field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int32,
    Int64,
    Double,
    /// Fixed-point decimal.
    Money,
    /// Second granularity date-time.
    Date,
    /// Microsecond granularity timestamp.
    Stamp,
    #[serde(rename = "string", alias = "utf8str")]
    Utf8Str,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Money => "money",
            Self::Date => "date",
            Self::Stamp => "stamp",
            Self::Utf8Str => "string",
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "double" => Ok(Self::Double),
            "money" => Ok(Self::Money),
            "date" => Ok(Self::Date),
            "stamp" => Ok(Self::Stamp),
            "string" | "utf8str" => Ok(Self::Utf8Str),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}
