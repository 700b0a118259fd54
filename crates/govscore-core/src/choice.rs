//! Polymorphic vote-choice encoding as handed over by the voting platform.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

/// Shape of a vote's `choice` field, classified once at deserialization.
///
/// Indices inside every shape are 1-origin and still unparsed; resolving them
/// against a proposal's choice labels is the linker's job.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteChoice {
    /// Single-choice ballot: one integer index.
    Single(i64),
    /// Single-choice index too large for `i64`. Always out of range.
    OversizedSingle(u64),
    /// Approval or ranked ballot: a list of indices, possibly nested one level.
    Ranked(Vec<JsonValue>),
    /// Weighted or quadratic ballot: index string mapped to a weight fraction.
    Weighted(Map<String, JsonValue>),
    /// Anything else (missing, null, string, float, bool). Counted in totals
    /// but never credited to a label.
    Unrecognized(JsonValue),
}

impl VoteChoice {
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(index), _) => Self::Single(index),
                (None, Some(index)) => Self::OversizedSingle(index),
                _ => Self::Unrecognized(JsonValue::Number(n)),
            },
            JsonValue::Array(items) => Self::Ranked(items),
            JsonValue::Object(map) => Self::Weighted(map),
            other => Self::Unrecognized(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) | Self::OversizedSingle(_) => "single",
            Self::Ranked(_) => "ranked",
            Self::Weighted(_) => "weighted",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

impl Default for VoteChoice {
    fn default() -> Self {
        Self::Unrecognized(JsonValue::Null)
    }
}

impl Serialize for VoteChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(index) => serializer.serialize_i64(*index),
            Self::OversizedSingle(index) => serializer.serialize_u64(*index),
            Self::Ranked(items) => items.serialize(serializer),
            Self::Weighted(map) => map.serialize(serializer),
            Self::Unrecognized(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for VoteChoice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Self::from_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_wire_shape() {
        assert_eq!(VoteChoice::from_json(json!(2)), VoteChoice::Single(2));
        assert!(matches!(VoteChoice::from_json(json!([1, [2, 3]])), VoteChoice::Ranked(items) if items.len() == 2));
        assert!(matches!(VoteChoice::from_json(json!({"1": 0.5})), VoteChoice::Weighted(map) if map.len() == 1));
        assert_eq!(
            VoteChoice::from_json(json!(u64::MAX)),
            VoteChoice::OversizedSingle(u64::MAX)
        );
        assert_eq!(VoteChoice::from_json(json!(1.5)), VoteChoice::Unrecognized(json!(1.5)));
        assert_eq!(VoteChoice::from_json(json!("1")), VoteChoice::Unrecognized(json!("1")));
        assert_eq!(VoteChoice::from_json(JsonValue::Null), VoteChoice::default());
    }

    #[test]
    fn serializes_back_to_the_raw_encoding() {
        let raw = json!({"1": 0.25, "3": 0.75});
        let choice: VoteChoice = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&choice).unwrap(), raw);
        assert_eq!(choice.kind(), "weighted");

        let oversized: VoteChoice = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(serde_json::to_string(&oversized).unwrap(), "18446744073709551615");
    }
}
