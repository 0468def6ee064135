use std::borrow::Cow;
use std::error::Error as StdError;

use serde::Serialize;

/// Error trait which bridge errors implement so that management tooling can
/// report them with a stable code.
pub trait DetailedError: StdError + Serialize {
    /// Identifying name of the error.
    fn error_code(&self) -> Cow<'static, str>;
}
