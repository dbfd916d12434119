/// Field-level write patches with server-side transforms
use crate::store::Fields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// How a single field is written
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    /// Write the value as-is (`Value::Null` clears the field)
    Value(Value),
    /// Replaced by the store's clock at commit time
    ServerTimestamp,
    /// Atomic add; a missing or non-numeric field counts as zero
    Increment(i64),
    /// Remove every occurrence of the element from an array field
    ArrayRemove(Value),
}

/// Ordered set of field writes applied to one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Vec<(String, FieldTransform)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields
            .push((field.to_string(), FieldTransform::Value(value.into())));
        self
    }

    pub fn set_null(self, field: &str) -> Self {
        self.set(field, Value::Null)
    }

    pub fn set_timestamp(self, field: &str, at: DateTime<Utc>) -> Self {
        self.set(field, timestamp_value(at))
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.fields
            .push((field.to_string(), FieldTransform::ServerTimestamp));
        self
    }

    pub fn increment(mut self, field: &str, delta: i64) -> Self {
        self.fields
            .push((field.to_string(), FieldTransform::Increment(delta)));
        self
    }

    pub fn array_remove(mut self, field: &str, element: impl Into<Value>) -> Self {
        self.fields.push((
            field.to_string(),
            FieldTransform::ArrayRemove(element.into()),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn transforms(&self) -> impl Iterator<Item = (&str, &FieldTransform)> {
        self.fields.iter().map(|(k, t)| (k.as_str(), t))
    }

    /// Apply every transform in order onto `target`
    pub fn apply(&self, target: &mut Fields, now: DateTime<Utc>) {
        for (field, transform) in &self.fields {
            match transform {
                FieldTransform::Value(value) => {
                    target.insert(field.clone(), value.clone());
                }
                FieldTransform::ServerTimestamp => {
                    target.insert(field.clone(), timestamp_value(now));
                }
                FieldTransform::Increment(delta) => {
                    let current = target.get(field).and_then(Value::as_i64).unwrap_or(0);
                    target.insert(field.clone(), Value::from(current.saturating_add(*delta)));
                }
                FieldTransform::ArrayRemove(element) => {
                    let mut items = array_items(target.get(field));
                    items.retain(|item| item != element);
                    target.insert(field.clone(), Value::Array(items));
                }
            }
        }
    }
}

fn array_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Canonical stored form of a timestamp (RFC 3339, UTC, millisecond precision)
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse a stored timestamp value
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_increment_missing_field_starts_at_zero() {
        let mut fields = Fields::new();
        let now = Utc::now();
        Patch::new().increment("bytes", 100).apply(&mut fields, now);
        Patch::new().increment("bytes", 25).apply(&mut fields, now);
        assert_eq!(fields["bytes"], json!(125));
    }

    #[test]
    fn test_array_remove() {
        let mut fields = Fields::new();
        fields.insert("participants".into(), json!(["u1", "u2", "u1"]));
        let now = Utc::now();

        Patch::new()
            .array_remove("participants", "u1")
            .apply(&mut fields, now);
        assert_eq!(fields["participants"], json!(["u2"]));

        // Removing from a missing field leaves an empty array
        Patch::new()
            .array_remove("tags", "x")
            .apply(&mut fields, now);
        assert_eq!(fields["tags"], json!([]));
    }

    #[test]
    fn test_server_timestamp_and_null() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut fields = Fields::new();
        fields.insert("banExpiry".into(), json!("2026-03-01T13:00:00.000Z"));

        Patch::new()
            .server_timestamp("bannedAt")
            .set_null("banExpiry")
            .apply(&mut fields, now);

        assert_eq!(fields["bannedAt"], json!("2026-03-01T12:00:00.000Z"));
        assert_eq!(fields["banExpiry"], Value::Null);
        assert_eq!(parse_timestamp(&fields["bannedAt"]), Some(now));
    }
}
