use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Map from flag key to evaluated [`Variant`], as returned by a fetch and by
/// [`Client::all`](crate::Client::all).
pub type Variants = HashMap<String, Variant>;

/// The evaluated outcome of a flag or experiment for a user.
///
/// A variant's identity is the flag key it was requested under. The `key`
/// field carries the variant name within the experiment (e.g. `"control"`),
/// which may differ from the flag key.
///
/// Variants are immutable once constructed.
///
/// # Examples
/// ```
/// # use experiment::Variant;
/// let variant = Variant::from_value("on").with_payload(serde_json::json!({"color": "blue"}));
/// assert_eq!(variant.value.as_deref(), Some("on"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Variant name within the experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// The variant value served to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Arbitrary JSON payload attached to the variant.
    ///
    /// `None` means the server sent no payload; `Some(Value::Null)` means an
    /// explicit null payload. The two states survive serialization.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_payload"
    )]
    pub payload: Option<serde_json::Value>,
    /// Key of the experiment this variant was evaluated for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_key: Option<String>,
}

impl Variant {
    /// Create a variant carrying only a value.
    pub fn from_value(value: impl Into<String>) -> Variant {
        Variant {
            value: Some(value.into()),
            ..Variant::default()
        }
    }

    /// Create a variant carrying only a variant key.
    pub fn from_key(key: impl Into<String>) -> Variant {
        Variant {
            key: Some(key.into()),
            ..Variant::default()
        }
    }

    /// Attach a variant key.
    pub fn with_key(mut self, key: impl Into<String>) -> Variant {
        self.key = Some(key.into());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Variant {
        self.payload = Some(payload);
        self
    }

    /// Attach an experiment key.
    pub fn with_exp_key(mut self, exp_key: impl Into<String>) -> Variant {
        self.exp_key = Some(exp_key.into());
        self
    }

    /// Returns true when every field is absent.
    ///
    /// An all-empty variant behaves as if the flag had never been evaluated:
    /// variant lookup treats it as missing. An explicit null payload counts
    /// as present.
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none() && self.payload.is_none() && self.exp_key.is_none()
    }

    /// Identity used for exposure deduplication: the variant key, falling
    /// back to the value.
    pub(crate) fn identity(&self) -> &str {
        self.key
            .as_deref()
            .or(self.value.as_deref())
            .unwrap_or_default()
    }
}

/// Deserializes a present field into `Some`, so `"payload": null` becomes
/// `Some(Value::Null)` while an absent field stays `None` (via the serde
/// `default`).
fn present_payload<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Variant;

    #[test]
    fn empty_variant_has_no_fields() {
        assert!(Variant::default().is_empty());
        assert!(!Variant::from_value("on").is_empty());
        assert!(!Variant::default().with_payload(json!(null)).is_empty());
    }

    #[test]
    fn identity_prefers_key_over_value() {
        let variant = Variant::from_value("on").with_key("treatment");
        assert_eq!(variant.identity(), "treatment");
        assert_eq!(Variant::from_value("on").identity(), "on");
        assert_eq!(Variant::default().identity(), "");
    }

    #[test]
    fn absent_payload_is_distinguishable_from_null() {
        let absent: Variant = serde_json::from_str(r#"{"key":"on"}"#).unwrap();
        assert_eq!(absent.payload, None);

        let null: Variant = serde_json::from_str(r#"{"key":"on","payload":null}"#).unwrap();
        assert_eq!(null.payload, Some(json!(null)));

        // And both serialize back to what they came from.
        assert_eq!(serde_json::to_string(&absent).unwrap(), r#"{"key":"on"}"#);
        assert_eq!(
            serde_json::to_string(&null).unwrap(),
            r#"{"key":"on","payload":null}"#
        );
    }

    #[test]
    fn exp_key_uses_camel_case_on_the_wire() {
        let variant: Variant =
            serde_json::from_str(r#"{"key":"on","expKey":"exp-1"}"#).unwrap();
        assert_eq!(variant.exp_key.as_deref(), Some("exp-1"));
    }
}
