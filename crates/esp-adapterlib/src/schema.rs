//! Window schemas.
//!
//! The engine describes a window's fields as a comma-separated list of
//! `name:type` entries, with `*` after the name marking key fields:
//!
//! ```text
//! id*:int64,name:string,age:int32
//! ```

use std::collections::HashSet;

use esp_types::{EspAddress, FieldType};
use serde::Serialize;

use crate::errors::{BridgeError, SchemaError};
use crate::transport::EspClientHandler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// 0-based position within the window.
    pub position: usize,
    pub name: String,
    pub field_type: FieldType,
    pub key: bool,
}

/// Ordered, typed field list of a stream window.
///
/// Positions are always `0..field_count()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Builds a schema from `(name, type, key)` triples.
    pub fn new<I, S>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, FieldType, bool)>,
        S: Into<String>,
    {
        let mut names = HashSet::new();
        let mut descriptors = Vec::new();
        for (position, (name, field_type, key)) in fields.into_iter().enumerate() {
            let name = name.into();
            if name.is_empty() {
                return Err(SchemaError::EmptyName { position });
            }
            if !names.insert(name.clone()) {
                return Err(SchemaError::DuplicateName { name });
            }
            descriptors.push(FieldDescriptor {
                position,
                name,
                field_type,
                key,
            });
        }
        if descriptors.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self {
            fields: descriptors,
        })
    }

    /// Parses a schema descriptor returned by the engine.
    pub fn parse(descriptor: &str) -> Result<Self, SchemaError> {
        if descriptor.trim().is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut fields = Vec::new();
        for (position, entry) in descriptor.split(',').enumerate() {
            let Some((name, field_type)) = entry.split_once(':') else {
                return Err(SchemaError::MalformedField {
                    position,
                    entry: entry.to_string(),
                });
            };
            let name = name.trim();
            let (name, key) = match name.strip_suffix('*') {
                Some(name) => (name.trim_end(), true),
                None => (name, false),
            };
            let field_type = field_type
                .parse::<FieldType>()
                .map_err(|error| SchemaError::UnknownType { position, error })?;
            fields.push((name.to_string(), field_type, key));
        }

        Self::new(fields)
    }

    /// Fetches the schema of the window at `address`.
    ///
    /// Fails with [`BridgeError::SchemaUnavailable`] if the engine cannot be
    /// reached or returns no metadata, and with [`BridgeError::InvalidSchema`]
    /// if the metadata cannot be parsed.
    pub fn fetch(handler: &dyn EspClientHandler, address: &EspAddress) -> Result<Self, BridgeError> {
        let url = address.schema_url();
        let metadata = handler
            .query_meta(&url)
            .map_err(|e| BridgeError::SchemaUnavailable {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let Some(descriptor) = metadata.and_then(|vector| vector.into_iter().next()) else {
            return Err(BridgeError::SchemaUnavailable {
                address: address.to_string(),
                reason: "engine returned no metadata; it seems to be offline or not reachable"
                    .to_string(),
            });
        };

        Self::parse(&descriptor).map_err(|error| BridgeError::InvalidSchema {
            address: address.to_string(),
            error,
        })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_at(&self, position: usize) -> Option<&FieldDescriptor> {
        self.fields.get(position)
    }

    pub fn name_at(&self, position: usize) -> Option<&str> {
        self.field_at(position).map(|field| field.name.as_str())
    }

    pub fn type_at(&self, position: usize) -> Option<FieldType> {
        self.field_at(position).map(|field| field.field_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Renders the schema back into the engine's descriptor syntax.
    pub fn descriptor(&self) -> String {
        self.fields
            .iter()
            .map(|field| {
                format!(
                    "{}{}:{}",
                    field.name,
                    if field.key { "*" } else { "" },
                    field.field_type
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod test {
    use super::Schema;
    use crate::errors::{BridgeError, SchemaError};
    use crate::event::EventBlock;
    use crate::transport::{ClientCallbacks, ClientId, EspClientHandler};
    use anyhow::{anyhow, Result as AnyResult};
    use esp_types::{EspAddress, FieldType};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn parse_descriptor() {
        let schema = Schema::parse("id*:int64,name:string,age:int32").unwrap();
        assert_eq!(schema.field_count(), 3);
        assert_eq!(schema.name_at(0), Some("id"));
        assert_eq!(schema.type_at(0), Some(FieldType::Int64));
        assert!(schema.field_at(0).unwrap().key);
        assert_eq!(schema.name_at(1), Some("name"));
        assert_eq!(schema.type_at(1), Some(FieldType::Utf8Str));
        assert!(!schema.field_at(1).unwrap().key);
        assert_eq!(schema.type_at(2), Some(FieldType::Int32));
        assert_eq!(schema.name_at(3), None);
        assert_eq!(schema.type_at(3), None);
        for (i, field) in schema.fields().iter().enumerate() {
            assert_eq!(field.position, i);
        }
        assert_eq!(schema.descriptor(), "id*:int64,name:string,age:int32");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Schema::parse(""), Err(SchemaError::Empty));
        assert_eq!(
            Schema::parse("id:int64,name"),
            Err(SchemaError::MalformedField {
                position: 1,
                entry: "name".to_string()
            })
        );
        assert!(matches!(
            Schema::parse("id:int64,name:varchar"),
            Err(SchemaError::UnknownType { position: 1, .. })
        ));
        assert_eq!(
            Schema::parse("id:int64,id:int32"),
            Err(SchemaError::DuplicateName {
                name: "id".to_string()
            })
        );
        assert_eq!(
            Schema::parse("*:int64"),
            Err(SchemaError::EmptyName { position: 0 })
        );
    }

    struct MetaOnly(AnyResult<Option<Vec<String>>>);

    impl EspClientHandler for MetaOnly {
        fn query_meta(&self, url: &str) -> AnyResult<Option<Vec<String>>> {
            assert!(url.ends_with("?get=schema"));
            match &self.0 {
                Ok(meta) => Ok(meta.clone()),
                Err(e) => Err(anyhow!("{e}")),
            }
        }
        fn publisher_start(&self, _: &str, _: Arc<dyn ClientCallbacks>) -> Option<ClientId> {
            unreachable!()
        }
        fn subscriber_start(&self, _: &str, _: Arc<dyn ClientCallbacks>) -> Option<ClientId> {
            unreachable!()
        }
        fn subscriber_max_queue_size(&self, _: &str, _: usize, _: bool) -> bool {
            unreachable!()
        }
        fn connect(&self, _: ClientId) -> AnyResult<()> {
            unreachable!()
        }
        fn publisher_inject(&self, _: ClientId, _: &EventBlock) -> bool {
            unreachable!()
        }
        fn quiesce_project(&self, _: &str, _: ClientId) -> AnyResult<()> {
            unreachable!()
        }
        fn disconnect(&self, _: ClientId, _: bool) -> AnyResult<()> {
            unreachable!()
        }
    }

    #[test]
    fn fetch() {
        let address = EspAddress::parse("dfESP://localhost:5555/p/q/w").unwrap();

        let handler = MetaOnly(Ok(Some(vec!["id*:int64,v:double".to_string()])));
        let schema = Schema::fetch(&handler, &address).unwrap();
        assert_eq!(schema.field_count(), 2);

        for handler in [
            MetaOnly(Ok(None)),
            MetaOnly(Ok(Some(Vec::new()))),
            MetaOnly(Err(anyhow!("unknown host"))),
        ] {
            assert!(matches!(
                Schema::fetch(&handler, &address),
                Err(BridgeError::SchemaUnavailable { .. })
            ));
        }

        let handler = MetaOnly(Ok(Some(vec!["id*:blob".to_string()])));
        assert!(matches!(
            Schema::fetch(&handler, &address),
            Err(BridgeError::InvalidSchema { .. })
        ));
    }
}
