use chrono::{DateTime, Utc};

use crate::issue::{CustomValue, NormalizedIssue, RawIssue, RawUser};

pub const JIRA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

pub const FIELD_CLOSED: &str = "customfield_20908";
pub const FIELD_HEAD: &str = "customfield_22501";
pub const FIELD_STARTED: &str = "customfield_18117";
pub const FIELD_FIREFIGHTING: &str = "customfield_21200";
pub const FIELD_SEVERITY: &str = "customfield_18119";
pub const FIELD_SERVICE: &str = "customfield_33803";
pub const FIELD_ROOT_CAUSE: &str = "customfield_37238";

const ZERO_TIME_SECS: i64 = -62_135_596_800;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("issue id '{id}' has no key")]
    MissingKey { id: String },
}

pub fn map_issue(raw: &RawIssue) -> Result<NormalizedIssue, MapError> {
    if raw.key.trim().is_empty() {
        return Err(MapError::MissingKey { id: raw.id.clone() });
    }

    let fields = &raw.fields;
    let custom = |id: &str| fields.custom.get(id);

    Ok(NormalizedIssue {
        key: raw.key.clone(),
        created: fields.created.as_deref().and_then(parse_timestamp),
        updated: fields.updated.as_deref().and_then(parse_timestamp),
        resolved: fields
            .resolutiondate
            .as_deref()
            .and_then(parse_timestamp)
            .filter(|ts| !is_zero_time(ts)),
        assignee: fields.assignee.as_ref().and_then(identity_name),
        reporter: fields.reporter.as_ref().and_then(identity_name),
        issuetype: fields
            .issuetype
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .filter(|name| !name.is_empty())
            .map(ToString::to_string),
        closed: custom(FIELD_CLOSED).and_then(custom_timestamp),
        started: custom(FIELD_STARTED).and_then(custom_timestamp),
        firefighting: custom(FIELD_FIREFIGHTING).and_then(custom_timestamp),
        head: custom(FIELD_HEAD)
            .and_then(CustomValue::object_name)
            .map(ToString::to_string),
        severity: custom(FIELD_SEVERITY)
            .and_then(CustomValue::object_value)
            .map(ToString::to_string),
        service: custom(FIELD_SERVICE)
            .and_then(CustomValue::first_string)
            .map(ToString::to_string),
        root_cause: custom(FIELD_ROOT_CAUSE)
            .and_then(CustomValue::first_string)
            .map(ToString::to_string),
        ..NormalizedIssue::default()
    })
}

pub fn map_issues(raw: &[RawIssue]) -> Vec<Result<NormalizedIssue, MapError>> {
    raw.iter().map(map_issue).collect()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), JIRA_TIMESTAMP_FORMAT)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn custom_timestamp(value: &CustomValue) -> Option<DateTime<Utc>> {
    value.as_text().and_then(parse_timestamp)
}

fn identity_name(user: &RawUser) -> Option<String> {
    user.display_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .or_else(|| user.name.as_deref().filter(|name| !name.is_empty()))
        .map(ToString::to_string)
}

fn is_zero_time(ts: &DateTime<Utc>) -> bool {
    ts.timestamp_subsec_nanos() == 0 && ts.timestamp() == ZERO_TIME_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawIssue {
        serde_json::from_value(value).expect("raw issue should decode")
    }

    #[test]
    fn maps_incident_with_value_and_list_fields() {
        let issue = raw(json!({
            "key": "INCI-1",
            "fields": {
                "resolutiondate": "0001-01-01T00:00:00.000+0000",
                "customfield_18119": {"value": "SEV2"},
                "customfield_33803": ["payments"]
            }
        }));

        let mapped = map_issue(&issue).expect("mapping should succeed");

        assert_eq!(mapped.key, "INCI-1");
        assert_eq!(mapped.resolved, None);
        assert_eq!(mapped.severity.as_deref(), Some("SEV2"));
        assert_eq!(mapped.service.as_deref(), Some("payments"));
        assert_eq!(mapped.root_cause, None);
        assert_eq!(mapped.closed, None);
    }

    #[test]
    fn resolution_is_unset_for_null_zero_time_and_garbage() {
        for value in [
            json!(null),
            json!("0001-01-01T00:00:00.000+0000"),
            json!("0001-01-01T03:00:00.000+0300"),
            json!("not a date"),
        ] {
            let issue = raw(json!({"key": "INCI-2", "fields": {"resolutiondate": value}}));
            let mapped = map_issue(&issue).expect("mapping should succeed");
            assert_eq!(mapped.resolved, None);
        }
    }

    #[test]
    fn epoch_resolution_is_a_real_timestamp() {
        let issue = raw(json!({
            "key": "INCI-2",
            "fields": {"resolutiondate": "1970-01-01T00:00:00.000+0000"}
        }));
        let mapped = map_issue(&issue).expect("mapping should succeed");
        assert_eq!(mapped.resolved, Utc.timestamp_opt(0, 0).single());
    }

    #[test]
    fn maps_standard_and_timestamp_fields() {
        let issue = raw(json!({
            "key": "INCI-3",
            "fields": {
                "created": "2026-02-20T10:00:00.000+0300",
                "updated": "2026-02-20T11:30:00+0000",
                "resolutiondate": "2026-02-21T09:00:00.500+0000",
                "assignee": {"displayName": "Dana Ops", "name": "dana"},
                "reporter": {"name": "robin"},
                "issuetype": {"name": "Incident"},
                "customfield_20908": "2026-02-21T10:00:00.000+0000",
                "customfield_18117": "2026-02-20T07:05:00.000+0000",
                "customfield_21200": "2026-02-20T07:10:00.000+0000",
                "customfield_22501": {"name": "oncall-head", "key": "head"},
                "customfield_37238": ["config change", "deploy"]
            }
        }));

        let mapped = map_issue(&issue).expect("mapping should succeed");

        assert_eq!(
            mapped.created,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 7, 0, 0).unwrap())
        );
        assert_eq!(
            mapped.updated,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 11, 30, 0).unwrap())
        );
        assert!(mapped.resolved.is_some());
        assert_eq!(
            mapped.closed,
            Some(Utc.with_ymd_and_hms(2026, 2, 21, 10, 0, 0).unwrap())
        );
        assert_eq!(
            mapped.started,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 7, 5, 0).unwrap())
        );
        assert_eq!(
            mapped.firefighting,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 7, 10, 0).unwrap())
        );
        assert_eq!(mapped.assignee.as_deref(), Some("Dana Ops"));
        assert_eq!(mapped.reporter.as_deref(), Some("robin"));
        assert_eq!(mapped.issuetype.as_deref(), Some("Incident"));
        assert_eq!(mapped.head.as_deref(), Some("oncall-head"));
        assert_eq!(mapped.root_cause.as_deref(), Some("config change"));
        assert_eq!(mapped.score, None);
        assert_eq!(mapped.environment, None);
    }

    #[test]
    fn mismatched_shapes_leave_only_that_field_unset() {
        let issue = raw(json!({
            "key": "INCI-4",
            "fields": {
                "issuetype": {"name": ""},
                "customfield_20908": "21/02/2026 10:00",
                "customfield_18117": {"value": "2026-02-20T07:05:00.000+0000"},
                "customfield_22501": "oncall-head",
                "customfield_18119": ["SEV1"],
                "customfield_33803": {"value": "payments"},
                "customfield_37238": [7],
                "customfield_21200": "2026-02-20T07:10:00.000+0000"
            }
        }));

        let mapped = map_issue(&issue).expect("mapping should succeed");

        assert_eq!(mapped.issuetype, None);
        assert_eq!(mapped.closed, None);
        assert_eq!(mapped.started, None);
        assert_eq!(mapped.head, None);
        assert_eq!(mapped.severity, None);
        assert_eq!(mapped.service, None);
        assert_eq!(mapped.root_cause, None);
        assert!(mapped.firefighting.is_some());
    }

    #[test]
    fn mapping_is_idempotent() {
        let issue = raw(json!({
            "key": "INCI-5",
            "fields": {
                "created": "2026-02-20T10:00:00.000+0000",
                "customfield_18119": {"value": "SEV3"}
            }
        }));

        assert_eq!(map_issue(&issue), map_issue(&issue));
    }

    #[test]
    fn batch_keeps_one_result_per_record() {
        let batch = vec![
            raw(json!({"key": "INCI-6", "fields": {}})),
            raw(json!({"id": "10007", "fields": {"customfield_18119": {"value": "SEV1"}}})),
            raw(json!({"key": "INCI-8"})),
        ];

        let mapped = map_issues(&batch);

        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0].as_ref().map(|i| i.key.as_str()), Ok("INCI-6"));
        assert_eq!(
            mapped[1],
            Err(MapError::MissingKey {
                id: "10007".to_string()
            })
        );
        assert_eq!(mapped[2].as_ref().map(|i| i.key.as_str()), Ok("INCI-8"));
    }

    #[test]
    fn parses_jira_timestamp_variants() {
        assert!(parse_timestamp("2026-02-20T10:00:00.123+0000").is_some());
        assert!(parse_timestamp("2026-02-20T10:00:00+0530").is_some());
        assert!(parse_timestamp("2026-02-20").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
