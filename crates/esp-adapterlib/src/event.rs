//! Engine-native events and the data items they are decoded into.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDateTime;
use esp_types::{EventFlags, FieldType, Opcode};
use serde::Serialize;

use crate::errors::CodecError;
use crate::schema::Schema;

/// Date-time format of `date` and `stamp` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Like [`DATE_FORMAT`], with optional fractional seconds.
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One event, validated against a window schema.
///
/// Field values keep the exact text they were constructed from; an empty value
/// is a null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EspEvent {
    pub opcode: Opcode,
    pub flags: EventFlags,
    values: Vec<String>,
}

impl EspEvent {
    /// Parses `line` of the form `opcode<d>flags<d>field0<d>field1...`, where
    /// `<d>` is `delimiter`, and checks every field against `schema`.
    ///
    /// Trailing empty fields are kept, so `"i,n,1,Bob,"` has three fields.
    pub fn from_csv(schema: &Schema, line: &str, delimiter: char) -> Result<Self, CodecError> {
        let mut parts = line.split(delimiter);
        let (Some(opcode), Some(flags)) = (parts.next(), parts.next()) else {
            return Err(CodecError::MissingPrefix {
                text: line.to_string(),
            });
        };

        let opcode = Opcode::from_code(opcode.trim()).ok_or_else(|| CodecError::UnknownOpcode {
            opcode: opcode.to_string(),
        })?;
        let flags = EventFlags::from_code(flags.trim()).ok_or_else(|| CodecError::UnknownFlags {
            flags: flags.to_string(),
        })?;

        let values: Vec<String> = parts.map(str::to_string).collect();
        Self::new(schema, opcode, flags, values)
    }

    pub fn new(
        schema: &Schema,
        opcode: Opcode,
        flags: EventFlags,
        values: Vec<String>,
    ) -> Result<Self, CodecError> {
        if values.len() != schema.field_count() {
            return Err(CodecError::FieldCountMismatch {
                expected: schema.field_count(),
                actual: values.len(),
            });
        }

        for (field, value) in schema.fields().iter().zip(values.iter()) {
            if value.is_empty() {
                if field.key {
                    return Err(CodecError::EmptyKey {
                        index: field.position,
                        name: field.name.clone(),
                    });
                }
                continue;
            }
            if !valid_value(field.field_type, value) {
                return Err(CodecError::InvalidValue {
                    index: field.position,
                    name: field.name.clone(),
                    field_type: field.field_type,
                    value: value.clone(),
                });
            }
        }

        Ok(Self {
            opcode,
            flags,
            values,
        })
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Renders the event the way the engine delivers it to subscribers:
    /// `I,N:` followed by the delimited field values.
    pub fn to_csv(&self, delimiter: char) -> String {
        let mut text = format!(
            "{},{}:",
            self.opcode.code().to_ascii_uppercase(),
            self.flags.code().to_ascii_uppercase()
        );
        text.push_str(&self.values.join(&delimiter.to_string()));
        text
    }
}

fn valid_value(field_type: FieldType, value: &str) -> bool {
    match field_type {
        FieldType::Int32 => value.parse::<i32>().is_ok(),
        FieldType::Int64 => value.parse::<i64>().is_ok(),
        FieldType::Double => value.parse::<f64>().is_ok(),
        FieldType::Money => valid_decimal(value),
        FieldType::Date => {
            value.parse::<i64>().is_ok() || NaiveDateTime::parse_from_str(value, DATE_FORMAT).is_ok()
        }
        FieldType::Stamp => {
            value.parse::<i64>().is_ok()
                || NaiveDateTime::parse_from_str(value, STAMP_FORMAT).is_ok()
        }
        FieldType::Utf8Str => true,
    }
}

fn valid_decimal(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    !(whole.is_empty() && fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A batch of events transmitted as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBlock {
    id: u64,
    events: Vec<EspEvent>,
}

impl EventBlock {
    /// Creates a block with a process-unique id.
    pub fn new(events: Vec<EspEvent>) -> Self {
        Self {
            id: NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed),
            events,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn events(&self) -> &[EspEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// One field of a received event, with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataItem {
    /// Position within the window.
    pub index: usize,
    pub name: String,
    /// Value as delivered by the engine.
    pub value: String,
    pub field_type: FieldType,
}

impl DataItem {
    pub fn new(index: usize, name: &str, value: &str, field_type: FieldType) -> Self {
        Self {
            index,
            name: name.to_string(),
            value: value.to_string(),
            field_type,
        }
    }
}

impl Display for DataItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataItem: ({}) {}={} (type: {})",
            self.index, self.name, self.value, self.field_type
        )
    }
}

#[cfg(test)]
mod test {
    use super::{DataItem, EspEvent, EventBlock};
    use crate::errors::CodecError;
    use crate::schema::Schema;
    use esp_types::{EventFlags, FieldType, Opcode};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn schema() -> Schema {
        Schema::parse("id*:int64,name:string,age:int32").unwrap()
    }

    #[test]
    fn from_csv() {
        let event = EspEvent::from_csv(&schema(), "i,n,1,Alice,30", ',').unwrap();
        assert_eq!(event.opcode, Opcode::Insert);
        assert_eq!(event.flags, EventFlags::Normal);
        assert_eq!(event.values(), ["1", "Alice", "30"]);
        assert_eq!(event.to_csv(','), "I,N:1,Alice,30");

        let event = EspEvent::from_csv(&schema(), "u,p,2,Bob,", ',').unwrap();
        assert_eq!(event.opcode, Opcode::Update);
        assert_eq!(event.flags, EventFlags::Partial);
        assert_eq!(event.values(), ["2", "Bob", ""]);
        assert_eq!(event.to_csv(','), "U,P:2,Bob,");

        let event = EspEvent::from_csv(&schema(), "d;n;3;Carol;41", ';').unwrap();
        assert_eq!(event.opcode, Opcode::Delete);
        assert_eq!(event.to_csv(';'), "D,N:3;Carol;41");
    }

    #[test]
    fn from_csv_errors() {
        assert_eq!(
            EspEvent::from_csv(&schema(), "i,n,1,Alice", ','),
            Err(CodecError::FieldCountMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            EspEvent::from_csv(&schema(), "i,n,1,Alice,30,", ','),
            Err(CodecError::FieldCountMismatch {
                expected: 3,
                actual: 4
            })
        );
        assert!(matches!(
            EspEvent::from_csv(&schema(), "1", ','),
            Err(CodecError::MissingPrefix { .. })
        ));
        assert!(matches!(
            EspEvent::from_csv(&schema(), "x,n,1,Alice,30", ','),
            Err(CodecError::UnknownOpcode { .. })
        ));
        assert!(matches!(
            EspEvent::from_csv(&schema(), "i,q,1,Alice,30", ','),
            Err(CodecError::UnknownFlags { .. })
        ));
        assert_eq!(
            EspEvent::from_csv(&schema(), "i,n,1,Alice,thirty", ','),
            Err(CodecError::InvalidValue {
                index: 2,
                name: "age".to_string(),
                field_type: FieldType::Int32,
                value: "thirty".to_string()
            })
        );
        assert_eq!(
            EspEvent::from_csv(&schema(), "i,n,,Alice,30", ','),
            Err(CodecError::EmptyKey {
                index: 0,
                name: "id".to_string()
            })
        );
    }

    #[test]
    fn typed_values() {
        let schema =
            Schema::parse("id*:int32,price:money,ratio:double,day:date,at:stamp").unwrap();
        for line in [
            "i,n,1,12.50,0.5,2024-01-31 10:00:00,2024-01-31 10:00:00.123456",
            "i,n,1,-3,1e10,1706695200,1706695200000000",
            "i,n,1,.5,,,",
        ] {
            assert!(EspEvent::from_csv(&schema, line, ',').is_ok(), "{line}");
        }
        for line in [
            "i,n,1,12.5.0,0.5,,",
            "i,n,1,.,0.5,,",
            "i,n,1,1,abc,,",
            "i,n,1,1,1,2024-13-01 00:00:00,",
            "i,n,1,1,1,,yesterday",
            "i,n,99999999999,1,1,,",
        ] {
            assert!(
                matches!(
                    EspEvent::from_csv(&schema, line, ','),
                    Err(CodecError::InvalidValue { .. })
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn block_ids_are_unique() {
        let a = EventBlock::new(Vec::new());
        let b = EventBlock::new(Vec::new());
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }

    #[test]
    fn data_item_display() {
        let item = DataItem::new(0, "id", "1", FieldType::Int64);
        assert_eq!(item.to_string(), "DataItem: (0) id=1 (type: int64)");
    }

    proptest! {
        #[test]
        fn numbers_keep_their_text(id in any::<i64>(), age in any::<i32>(), cents in 0u32..100) {
            let schema = Schema::parse("id*:int64,age:int32,price:money").unwrap();
            let line = format!("p,n,{id},{age},{age}.{cents:02}");
            let event = EspEvent::from_csv(&schema, &line, ',').unwrap();
            prop_assert_eq!(event.to_csv(','), format!("P,N:{id},{age},{age}.{cents:02}"));
        }
    }
}
