//! Conversion between delimited text and engine events.

use esp_adapterlib::{CodecError, DataItem, EspEvent, Schema};

/// Length of the opcode prefix on event text delivered by the engine
/// (`I,N:`).
pub const OPCODE_PREFIX_LEN: usize = 4;

/// Decodes the textual form of a received event into one [`DataItem`] per
/// schema field.
///
/// The opcode prefix is cut off and the rest is split on `delimiter`, keeping
/// trailing empty fields. The number of fields must match the schema exactly;
/// a mismatch means the engine's window no longer matches the schema this
/// connection was set up with.
pub fn decode_inbound(
    text: &str,
    schema: &Schema,
    delimiter: char,
) -> Result<Vec<DataItem>, CodecError> {
    let Some(data) = text.get(OPCODE_PREFIX_LEN..) else {
        return Err(CodecError::MissingPrefix {
            text: text.to_string(),
        });
    };

    let values: Vec<&str> = data.split(delimiter).collect();
    if values.len() != schema.field_count() {
        return Err(CodecError::FieldCountMismatch {
            expected: schema.field_count(),
            actual: values.len(),
        });
    }

    Ok(schema
        .fields()
        .iter()
        .zip(values)
        .map(|(field, value)| DataItem::new(field.position, &field.name, value, field.field_type))
        .collect())
}

/// Builds an engine event from `prefix` followed by `line`.
pub fn encode_outbound(
    line: &str,
    prefix: &str,
    schema: &Schema,
    delimiter: char,
) -> Result<EspEvent, CodecError> {
    let mut text = String::with_capacity(prefix.len() + line.len());
    text.push_str(prefix);
    text.push_str(line);
    EspEvent::from_csv(schema, &text, delimiter)
}
