use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A typed scalar simulation parameter value.
///
/// Serializes untagged, so a `ParameterSet` lands on the wire as a plain
/// JSON object of numbers, booleans, and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integral value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Anything else, kept verbatim.
    Text(String),
}

/// Mapping from parameter name to its typed value.
///
/// Keys are unique; iteration follows insertion order so serialized
/// documents stay stable across runs. Parameter-name validity is owned by
/// the remote service, not this layer.
pub type ParameterSet = IndexMap<String, ParamValue>;

/// Converts a trimmed text token to the most specific type it can represent.
///
/// Tries integer, then float, then a case-insensitive boolean literal, and
/// falls back to the original string. The ordering matters: `"2"` must come
/// back integral and `"2.5"` as a float. Never fails.
#[must_use]
pub fn coerce(token: &str) -> ParamValue {
    if let Ok(value) = token.parse::<i64>() {
        return ParamValue::Int(value);
    }
    if let Ok(value) = token.parse::<f64>() {
        return ParamValue::Float(value);
    }
    if token.eq_ignore_ascii_case("true") {
        return ParamValue::Bool(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return ParamValue::Bool(false);
    }
    ParamValue::Text(token.to_string())
}
