//! Wire types exchanged with the slave control API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry in the fleet listing (`GET /slaves`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveSummary {
    pub name: String,
    /// Remaining descriptor fields, passed through untouched.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SlaveSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

/// Response body of `GET /slaves`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveList {
    pub slaves: Vec<SlaveSummary>,
}

/// A finished job as reported in a slave's history.
///
/// On the wire `endtime` is a unix timestamp in seconds, possibly
/// fractional. Timestamps that cannot be represented fail decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(with = "unix_seconds")]
    pub endtime: DateTime<Utc>,
}

impl JobRecord {
    /// Build a record from a unix timestamp, or `None` if it is out of range.
    pub fn from_unix_seconds(endtime: f64) -> Option<Self> {
        unix_seconds::to_datetime(endtime).map(|endtime| Self { endtime })
    }
}

mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn to_datetime(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() || secs.abs() > i64::MAX as f64 {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
    }

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9;
        serializer.serialize_f64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        to_datetime(secs).ok_or_else(|| de::Error::custom(format!("endtime out of range: {secs}")))
    }
}

/// Response body of `GET /slaves/{name}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaveInfo {
    /// Most recent first. A missing or null list means no history.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recent_jobs: Vec<JobRecord>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SlaveInfo {
    /// End time of the most recent job, or `None` if the slave has no history.
    pub fn last_job_end(&self) -> Option<DateTime<Utc>> {
        self.recent_jobs.first().map(|job| job.endtime)
    }
}

/// State of an asynchronous action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ActionState {
    Pending,
    Running,
    Success,
    Failure,
}

impl ActionState {
    /// SUCCESS and FAILURE end a request; PENDING and RUNNING are in flight.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl TryFrom<u8> for ActionState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Running),
            2 => Ok(Self::Success),
            3 => Ok(Self::Failure),
            other => Err(format!("unknown action state: {other}")),
        }
    }
}

impl From<ActionState> for u8 {
    fn from(state: ActionState) -> Self {
        match state {
            ActionState::Pending => 0,
            ActionState::Running => 1,
            ActionState::Success => 2,
            ActionState::Failure => 3,
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Response body of action endpoints (`shutdown_buildslave`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub state: ActionState,
    pub requestid: i64,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, ActionState::Pending, false)]
    #[case(1, ActionState::Running, false)]
    #[case(2, ActionState::Success, true)]
    #[case(3, ActionState::Failure, true)]
    fn test_action_state_decoding(
        #[case] raw: u8,
        #[case] expected: ActionState,
        #[case] terminal: bool,
    ) {
        let body = format!(r#"{{"state": {raw}, "requestid": 7}}"#);
        let response: ActionResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.state, expected);
        assert_eq!(response.requestid, 7);
        assert_eq!(response.state.is_terminal(), terminal);
    }

    #[test]
    fn test_unknown_action_state_is_rejected() {
        let result = serde_json::from_str::<ActionResponse>(r#"{"state": 9, "requestid": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_last_job_end_uses_first_entry() {
        let info: SlaveInfo = serde_json::from_str(
            r#"{"recent_jobs": [{"endtime": 1700000000}, {"endtime": 1600000000}]}"#,
        )
        .unwrap();
        assert_eq!(info.last_job_end().unwrap().timestamp(), 1_700_000_000);
    }

    #[rstest]
    #[case::empty(r#"{"recent_jobs": []}"#)]
    #[case::null(r#"{"recent_jobs": null}"#)]
    #[case::absent(r#"{"name": "build-01"}"#)]
    fn test_missing_history_has_no_last_job(#[case] body: &str) {
        let info: SlaveInfo = serde_json::from_str(body).unwrap();
        assert!(info.recent_jobs.is_empty());
        assert!(info.last_job_end().is_none());
    }

    #[test]
    fn test_fractional_endtime() {
        let info: SlaveInfo =
            serde_json::from_str(r#"{"recent_jobs": [{"endtime": 1700000000.5}]}"#).unwrap();
        let ended = info.last_job_end().unwrap();
        assert_eq!(ended.timestamp(), 1_700_000_000);
        assert_eq!(ended.timestamp_subsec_millis(), 500);
    }

    #[rstest]
    #[case(r#"{"recent_jobs": [{"endtime": 1e300}]}"#)]
    #[case(r#"{"recent_jobs": [{"endtime": -1e300}]}"#)]
    #[case(r#"{"recent_jobs": [{"endtime": "yesterday"}]}"#)]
    fn test_unrepresentable_endtime_fails_decoding(#[case] body: &str) {
        assert!(serde_json::from_str::<SlaveInfo>(body).is_err());
    }

    #[test]
    fn test_job_record_from_unix_seconds() {
        let job = JobRecord::from_unix_seconds(1_700_000_000.0).unwrap();
        assert_eq!(job.endtime.timestamp(), 1_700_000_000);
        assert!(JobRecord::from_unix_seconds(f64::NAN).is_none());
        assert!(JobRecord::from_unix_seconds(1e300).is_none());

        let encoded = serde_json::to_value(job).unwrap();
        assert_eq!(encoded["endtime"], serde_json::json!(1_700_000_000.0));
    }

    #[test]
    fn test_slave_list_tolerates_extra_fields() {
        let list: SlaveList = serde_json::from_str(
            r#"{"slaves": [{"name": "build-01", "environment": "prod", "enabled": true, "notes": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(list.slaves.len(), 1);
        assert_eq!(list.slaves[0].name, "build-01");
        assert_eq!(
            list.slaves[0].attributes.get("environment"),
            Some(&serde_json::json!("prod"))
        );
    }
}
