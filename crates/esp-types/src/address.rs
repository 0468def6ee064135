//! Stream window addresses.
//!
//! Every window bridged by this crate is identified by an address of the form
//!
//! ```text
//! dfESP://host[:port]/project/continuous_query/window
//! ```
//!
//! The three path segments are restricted to ASCII alphanumerics and `_`.
//! Options (`?mode=insert&quiesce=true`) are not part of the address; see
//! [`split_options`].

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Scheme token that every address must start with.
pub const ESP_SCHEME: &str = "dfESP";

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^dfESP://(?P<host>[-a-zA-Z0-9.]+|\[[0-9a-fA-F:.]+\])(?::(?P<port>[0-9]{1,5}))?/(?P<project>[a-zA-Z0-9_]+)/(?P<query>[a-zA-Z0-9_]+)/(?P<window>[a-zA-Z0-9_]+)$",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("given url ({address}) does not match required pattern: dfESP://host:port/project/contquery/window")]
    PatternMismatch { address: String },

    #[error("given url ({address}) has an out-of-range port '{port}'")]
    InvalidPort { address: String, port: String },
}

/// Identity of a stream window inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct EspAddress {
    pub host: String,
    pub port: Option<u16>,
    pub project: String,
    pub continuous_query: String,
    pub window: String,
}

impl EspAddress {
    /// Parses an address without options. Use [`split_options`] first if the
    /// string may carry a query part.
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let captures =
            ADDRESS_PATTERN
                .captures(address)
                .ok_or_else(|| AddressError::PatternMismatch {
                    address: address.to_string(),
                })?;

        let port = match captures.name("port") {
            None => None,
            Some(port) => Some(port.as_str().parse::<u16>().map_err(|_| {
                AddressError::InvalidPort {
                    address: address.to_string(),
                    port: port.as_str().to_string(),
                }
            })?),
        };

        Ok(Self {
            host: captures["host"].to_string(),
            port,
            project: captures["project"].to_string(),
            continuous_query: captures["query"].to_string(),
            window: captures["window"].to_string(),
        })
    }

    /// `dfESP://host[:port]`
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{ESP_SCHEME}://{}:{port}", self.host),
            None => format!("{ESP_SCHEME}://{}", self.host),
        }
    }

    /// Url of the project that contains this window (query and window cut
    /// off). Quiesce requests are scoped to this url.
    pub fn project_url(&self) -> String {
        format!("{}/{}", self.authority(), self.project)
    }

    /// Two addresses belong to the same project if host, port and project
    /// match.
    pub fn same_project(&self, other: &EspAddress) -> bool {
        self.host == other.host && self.port == other.port && self.project == other.project
    }

    /// Url used to query the window's metadata.
    pub fn schema_url(&self) -> String {
        format!("{self}?get=schema")
    }

    /// Url used to subscribe to the window, optionally requesting its current
    /// contents first.
    pub fn subscribe_url(&self, snapshot: bool) -> String {
        format!("{self}?snapshot={snapshot}")
    }
}

impl Display for EspAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.authority(),
            self.project,
            self.continuous_query,
            self.window
        )
    }
}

impl FromStr for EspAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits `uri` into the address part and the (possibly empty) option query.
pub fn split_options(uri: &str) -> (&str, &str) {
    match uri.split_once('?') {
        Some((address, options)) => (address, options),
        None => (uri, ""),
    }
}
