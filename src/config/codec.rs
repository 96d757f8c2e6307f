//! Bidirectional text ⇄ value conversion for configuration variables.
//!
//! Every configuration value type implements [`ConfigValue`], a pair of
//! conversions between the in-memory value and its YAML textual form.
//! Scalars parse with `FromStr` on the trimmed input — the whole input must
//! be consumed, so trailing garbage is an error — and format with
//! `ToString`. Container implementations parse the input as a YAML tree and
//! recursively feed each element's textual form to the element codec, so a
//! `Vec<MyRecord>` works as soon as `MyRecord: ConfigValue`.
//!
//! Composite record types implement the trait by hand, typically by
//! delegating to a `serde` representation; see
//! [`ThreadPoolConfig`](crate::pool::ThreadPoolConfig) for the in-crate
//! example.
//!
//! Round-trip invariant: for every covered type, `from(to(v)) == v` under
//! the type's own equality (multiset equality for unordered containers).

use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use thiserror::Error;

/// Errors produced by [`ConfigValue`] conversions.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A scalar failed to parse, or parsed with trailing garbage.
    #[error("invalid {type_name} scalar: {text:?}")]
    InvalidScalar {
        /// The target scalar type.
        type_name: &'static str,
        /// The offending input.
        text: String,
    },

    /// The input was not valid YAML, or a value failed to serialize.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// The YAML tree had the wrong shape for the target type.
    #[error("expected a YAML {expected}, found {found}")]
    UnexpectedShape {
        /// What the codec needed.
        expected: &'static str,
        /// What the document contained.
        found: &'static str,
    },
}

/// Conversion between a configuration value and its YAML textual form.
pub trait ConfigValue: Sized {
    /// Parses the YAML textual form into a value.
    fn from_yaml_str(text: &str) -> Result<Self, CodecError>;

    /// Serializes the value into its YAML textual form.
    fn to_yaml_string(&self) -> Result<String, CodecError>;
}

/// Textual form of a parsed YAML node.
///
/// Strings yield their raw content (no quoting); everything else is dumped
/// and stripped of the serializer's trailing newline.
pub(crate) fn node_text(node: &Value) -> Result<String, CodecError> {
    match node {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_yaml::to_string(other)?.trim_end().to_string()),
    }
}

/// Parses a value's textual form back into a YAML node.
fn text_to_node(text: &str) -> Result<Value, CodecError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Scalar text of a mapping key, if the key is a scalar.
pub(crate) fn key_text(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn shape_name(node: &Value) -> &'static str {
    match node {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

macro_rules! scalar_config_value {
    ($($ty:ty),* $(,)?) => {$(
        impl ConfigValue for $ty {
            fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
                text.trim().parse().map_err(|_| CodecError::InvalidScalar {
                    type_name: std::any::type_name::<$ty>(),
                    text: text.to_string(),
                })
            }

            fn to_yaml_string(&self) -> Result<String, CodecError> {
                Ok(self.to_string())
            }
        }
    )*};
}

scalar_config_value!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl ConfigValue for String {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        Ok(text.to_string())
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        Ok(self.clone())
    }
}

fn sequence_items(text: &str) -> Result<Vec<Value>, CodecError> {
    match serde_yaml::from_str(text)? {
        Value::Sequence(items) => Ok(items),
        other => Err(CodecError::UnexpectedShape {
            expected: "sequence",
            found: shape_name(&other),
        }),
    }
}

fn sequence_text<'a, T, I>(items: I) -> Result<String, CodecError>
where
    T: ConfigValue + 'a,
    I: Iterator<Item = &'a T>,
{
    let nodes = items
        .map(|item| text_to_node(&item.to_yaml_string()?))
        .collect::<Result<Vec<_>, _>>()?;
    node_text(&Value::Sequence(nodes))
}

fn mapping_entries(text: &str) -> Result<Mapping, CodecError> {
    match serde_yaml::from_str(text)? {
        Value::Mapping(map) => Ok(map),
        other => Err(CodecError::UnexpectedShape {
            expected: "mapping",
            found: shape_name(&other),
        }),
    }
}

fn mapping_text<'a, T, I>(entries: I) -> Result<String, CodecError>
where
    T: ConfigValue + 'a,
    I: Iterator<Item = (&'a String, &'a T)>,
{
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(
            Value::String(key.clone()),
            text_to_node(&value.to_yaml_string()?)?,
        );
    }
    node_text(&Value::Mapping(map))
}

impl<T: ConfigValue> ConfigValue for Vec<T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        sequence_items(text)?
            .iter()
            .map(|item| T::from_yaml_str(&node_text(item)?))
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        sequence_text(self.iter())
    }
}

impl<T: ConfigValue> ConfigValue for VecDeque<T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        sequence_items(text)?
            .iter()
            .map(|item| T::from_yaml_str(&node_text(item)?))
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        sequence_text(self.iter())
    }
}

impl<T: ConfigValue + Ord> ConfigValue for BTreeSet<T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        sequence_items(text)?
            .iter()
            .map(|item| T::from_yaml_str(&node_text(item)?))
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        sequence_text(self.iter())
    }
}

impl<T: ConfigValue + Eq + Hash> ConfigValue for HashSet<T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        sequence_items(text)?
            .iter()
            .map(|item| T::from_yaml_str(&node_text(item)?))
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        sequence_text(self.iter())
    }
}

impl<T: ConfigValue> ConfigValue for BTreeMap<String, T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        mapping_entries(text)?
            .iter()
            .map(|(key, value)| {
                let key = key_text(key).ok_or(CodecError::UnexpectedShape {
                    expected: "scalar mapping key",
                    found: shape_name(key),
                })?;
                Ok((key, T::from_yaml_str(&node_text(value)?)?))
            })
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        mapping_text(self.iter())
    }
}

impl<T: ConfigValue> ConfigValue for HashMap<String, T> {
    fn from_yaml_str(text: &str) -> Result<Self, CodecError> {
        mapping_entries(text)?
            .iter()
            .map(|(key, value)| {
                let key = key_text(key).ok_or(CodecError::UnexpectedShape {
                    expected: "scalar mapping key",
                    found: shape_name(key),
                })?;
                Ok((key, T::from_yaml_str(&node_text(value)?)?))
            })
            .collect()
    }

    fn to_yaml_string(&self) -> Result<String, CodecError> {
        mapping_text(self.iter())
    }
}
