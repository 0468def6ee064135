//! Applies an [`InsertMode`] to outbound lines.

use std::borrow::Cow;

use esp_types::InsertMode;
use uuid::Uuid;

/// Generates the identifier that `mode` prepends to a line, if any.
///
/// Must be called once per line so that every line gets its own id.
pub fn generate_id(mode: InsertMode) -> Option<Uuid> {
    mode.adds_id().then(Uuid::new_v4)
}

/// Returns the opcode prefix of `mode` rendered with `delimiter`.
pub fn prefix(mode: InsertMode, delimiter: char) -> Cow<'static, str> {
    let prefix = mode.prefix();
    if delimiter == ',' {
        Cow::Borrowed(prefix)
    } else {
        Cow::Owned(prefix.replace(',', &delimiter.to_string()))
    }
}

/// Returns `(line, prefix)` for one outbound line: `line` with `id` as its
/// leading field when given, and the prefix to put in front of it.
pub fn prefix_for(
    mode: InsertMode,
    line: &str,
    delimiter: char,
    id: Option<Uuid>,
) -> (String, Cow<'static, str>) {
    let line = match id {
        Some(id) => format!("{id}{delimiter}{line}"),
        None => line.to_string(),
    };
    (line, prefix(mode, delimiter))
}
