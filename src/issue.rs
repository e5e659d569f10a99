use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: RawFields,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFields {
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub resolutiondate: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub assignee: Option<RawUser>,
    #[serde(default, deserialize_with = "lenient")]
    pub reporter: Option<RawUser>,
    #[serde(default, deserialize_with = "lenient")]
    pub issuetype: Option<RawIssueType>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, CustomValue>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawIssueType {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum CustomValue {
    Null,
    Text(String),
    Object(Map<String, Value>),
    List(Vec<Value>),
    Other(Value),
}

impl From<Value> for CustomValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CustomValue::Null,
            Value::String(text) => CustomValue::Text(text),
            Value::Object(map) => CustomValue::Object(map),
            Value::Array(items) => CustomValue::List(items),
            other => CustomValue::Other(other),
        }
    }
}

impl CustomValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CustomValue::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn object_name(&self) -> Option<&str> {
        self.object_str("name")
    }

    pub fn object_value(&self) -> Option<&str> {
        self.object_str("value")
    }

    pub fn first_string(&self) -> Option<&str> {
        match self {
            CustomValue::List(items) => match items.first() {
                Some(Value::String(first)) if !first.is_empty() => Some(first),
                _ => None,
            },
            _ => None,
        }
    }

    fn object_str(&self, property: &str) -> Option<&str> {
        match self {
            CustomValue::Object(map) => match map.get(property) {
                Some(Value::String(text)) if !text.is_empty() => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedIssue {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firefighting: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_search_issue_with_custom_fields() {
        let issue: RawIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "INCI-7",
            "fields": {
                "created": "2026-02-20T10:00:00.000+0000",
                "resolutiondate": null,
                "assignee": {"displayName": "Dana Ops", "name": "dana"},
                "reporter": null,
                "issuetype": {"name": "Incident"},
                "customfield_18119": {"value": "SEV1", "id": "3"},
                "customfield_33803": ["payments", "ledger"],
                "customfield_20908": "2026-02-20T12:00:00.000+0000",
                "customfield_21501": null,
                "customfield_24800": 4
            }
        }))
        .expect("issue should decode");

        assert_eq!(issue.key, "INCI-7");
        assert_eq!(issue.fields.resolutiondate, None);
        assert_eq!(issue.fields.reporter, None);
        assert_eq!(
            issue.fields.custom.get("customfield_18119").and_then(CustomValue::object_value),
            Some("SEV1")
        );
        assert_eq!(
            issue.fields.custom.get("customfield_33803").and_then(CustomValue::first_string),
            Some("payments")
        );
        assert_eq!(
            issue.fields.custom.get("customfield_21501"),
            Some(&CustomValue::Null)
        );
        assert!(matches!(
            issue.fields.custom.get("customfield_24800"),
            Some(CustomValue::Other(_))
        ));
    }

    #[test]
    fn malformed_standard_fields_decode_as_unset() {
        let issues: Vec<RawIssue> = serde_json::from_value(json!([
            {
                "key": "INCI-1",
                "fields": {
                    "assignee": "bob",
                    "reporter": ["robin"],
                    "issuetype": 7,
                    "created": 1700000000,
                    "customfield_18119": {"value": "SEV1"}
                }
            },
            {
                "key": "INCI-2",
                "fields": {"assignee": {"displayName": "Dana Ops"}}
            }
        ]))
        .expect("page should decode");

        let fields = &issues[0].fields;
        assert_eq!(fields.assignee, None);
        assert_eq!(fields.reporter, None);
        assert_eq!(fields.issuetype, None);
        assert_eq!(fields.created, None);
        assert!(!fields.custom.contains_key("assignee"));
        assert_eq!(
            fields.custom.get("customfield_18119").and_then(CustomValue::object_value),
            Some("SEV1")
        );
        assert_eq!(
            issues[1]
                .fields
                .assignee
                .as_ref()
                .and_then(|user| user.display_name.as_deref()),
            Some("Dana Ops")
        );
    }

    #[test]
    fn shape_helpers_reject_other_shapes() {
        let text = CustomValue::from(json!("payments"));
        let named = CustomValue::from(json!({"name": "oncall-head"}));
        let list = CustomValue::from(json!([42, "payments"]));
        let empty_list = CustomValue::from(json!([]));

        assert_eq!(text.object_value(), None);
        assert_eq!(text.first_string(), None);
        assert_eq!(named.object_name(), Some("oncall-head"));
        assert_eq!(named.object_value(), None);
        assert_eq!(named.as_text(), None);
        assert_eq!(list.first_string(), None);
        assert_eq!(empty_list.first_string(), None);
        assert_eq!(CustomValue::from(json!("")).as_text(), None);
    }
}
