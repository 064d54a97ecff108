//! Avro codec compiled from a registry definition.

use apache_avro::types::Value;
use apache_avro::{from_avro_datum, to_avro_datum, Schema};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::registry::SchemaType;

/// Compiled encoder/decoder for one schema definition.
///
/// Native values go through serde: anything that serializes into a shape the
/// schema accepts can be encoded (structs, maps, `serde_json::Value`, scalars),
/// and decoded payloads can be materialized into any `DeserializeOwned` type
/// with a matching shape.
#[derive(Debug, Clone)]
pub struct AvroCodec {
    schema: Schema,
}

impl AvroCodec {
    /// Compile a definition. Only Avro definitions are supported.
    pub fn compile(definition: &str, schema_type: SchemaType) -> Result<Self, CodecError> {
        if schema_type != SchemaType::Avro {
            return Err(CodecError::UnsupportedSchemaType(schema_type.to_string()));
        }
        let schema = Schema::parse_str(definition).map_err(CodecError::InvalidSchema)?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parsing Canonical Form of the compiled schema.
    pub fn canonical_form(&self) -> String {
        self.schema.canonical_form()
    }

    /// Encode a native value into the Avro binary representation (no framing).
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let value = apache_avro::to_value(value).map_err(CodecError::Encode)?;
        // Resolution coerces serde's generic shapes (maps, longs) into the
        // schema's record/int types. It narrows longs into ints with a plain
        // cast, so the result is checked against the original.
        let resolved = value.clone().resolve(&self.schema).map_err(CodecError::Encode)?;
        check_narrowing(&value, &resolved)?;
        to_avro_datum(&self.schema, resolved).map_err(CodecError::Encode)
    }

    /// Decode an Avro binary payload into a native value.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        let value = self.decode_value(payload)?;
        apache_avro::from_value(&value).map_err(CodecError::Decode)
    }

    /// Decode an Avro binary payload into a generic Avro value.
    pub fn decode_value(&self, payload: &[u8]) -> Result<Value, CodecError> {
        let mut reader = payload;
        from_avro_datum(&self.schema, &mut reader, None).map_err(CodecError::Decode)
    }
}

/// Walk a resolved value next to the value it came from and reject any
/// `long` that was truncated into an `int`.
fn check_narrowing(original: &Value, resolved: &Value) -> Result<(), CodecError> {
    let original = match original {
        Value::Union(_, inner) => inner.as_ref(),
        other => other,
    };

    match (original, resolved) {
        (Value::Long(wide), Value::Int(narrow)) if i64::from(*narrow) != *wide => {
            Err(CodecError::IntOutOfRange(*wide))
        }
        (_, Value::Union(_, inner)) => check_narrowing(original, inner),
        (Value::Array(before), Value::Array(after)) => before
            .iter()
            .zip(after)
            .try_for_each(|(b, a)| check_narrowing(b, a)),
        (Value::Map(before), Value::Map(after)) => after.iter().try_for_each(|(key, a)| {
            before.get(key).map_or(Ok(()), |b| check_narrowing(b, a))
        }),
        (Value::Record(before), Value::Record(after)) => after.iter().try_for_each(|(name, a)| {
            before
                .iter()
                .find(|(field, _)| field == name)
                .map_or(Ok(()), |(_, b)| check_narrowing(b, a))
        }),
        (Value::Map(before), Value::Record(after)) => after.iter().try_for_each(|(name, a)| {
            before.get(name).map_or(Ok(()), |b| check_narrowing(b, a))
        }),
        _ => Ok(()),
    }
}
