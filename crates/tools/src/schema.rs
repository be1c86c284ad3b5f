//! Parameter types and their JSON schema fragments.

use serde_json::{json, Value};

/// Declared type of a tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Integer,
    Number,
    Boolean,
    String,
    /// The absent value; only meaningful inside a union.
    Null,
    Optional(Box<ParamType>),
    List(Box<ParamType>),
    /// String-keyed mapping to values of the inner type.
    Map(Box<ParamType>),
    Union(Vec<ParamType>),
    /// Nested structured type, given as its full object schema.
    Structured(Value),
    Unknown,
}

impl ParamType {
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    pub fn list(item: ParamType) -> Self {
        ParamType::List(Box::new(item))
    }

    pub fn map(value: ParamType) -> Self {
        ParamType::Map(Box::new(value))
    }

    pub fn union(members: impl IntoIterator<Item = ParamType>) -> Self {
        ParamType::Union(members.into_iter().collect())
    }

    pub fn structured(schema: Value) -> Self {
        ParamType::Structured(schema)
    }

    /// JSON schema fragment for this type.
    pub fn schema(&self) -> Value {
        match self {
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::String => json!({"type": "string"}),
            ParamType::Structured(schema) => {
                let mut schema = schema.clone();
                if let Some(object) = schema.as_object_mut() {
                    object.remove("title");
                }
                schema
            }
            ParamType::List(item) => json!({
                "type": "array",
                "items": item.schema()
            }),
            ParamType::Map(value) => json!({
                "type": "object",
                "additionalProperties": value.schema()
            }),
            ParamType::Optional(inner) => inner.schema(),
            ParamType::Union(members) => {
                let present = present_members(members);
                match present.as_slice() {
                    [] => json!({"type": "string"}),
                    [single] => single.schema(),
                    _ => json!({
                        "anyOf": present.iter().map(|m| m.schema()).collect::<Vec<_>>()
                    }),
                }
            }
            ParamType::Null | ParamType::Unknown => json!({"type": "string"}),
        }
    }
}

/// Union members with absent alternatives removed and optionals unwrapped.
fn present_members(members: &[ParamType]) -> Vec<&ParamType> {
    let mut out = Vec::new();
    for member in members {
        match member {
            ParamType::Null => {}
            ParamType::Optional(inner) => out.extend(present_members(std::slice::from_ref(inner.as_ref()))),
            ParamType::Union(nested) => out.extend(present_members(nested)),
            other => out.push(other),
        }
    }
    out
}
