//! Exchange payload
//!
//! The portable form of the state, shared by file export/import and by the
//! persisted snapshot other contexts read. Course references are titles,
//! never ids. Collections that are absent from a payload are left alone on
//! import.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::TransferError;
use crate::models::{DegreePlan, Wellness};

/// One record as a JSON object
pub type ExchangeRecord = Map<String, Value>;

/// Top-level keys that identify a payload
pub const KNOWN_KEYS: &[&str] = &[
    "sessions",
    "exams",
    "examGrades",
    "tasks",
    "schedule",
    "timetableEvents",
    "regularEvents",
    "sessionTasks",
    "weeklyGoals",
    "degreePlan",
    "wellness",
    "settings",
];

/// Version written into exported files
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exams: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_grades: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timetable_events: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_events: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_tasks: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_goals: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_plan: Option<DegreePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wellness: Option<Wellness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ExchangeSettings>,
}

/// Settings section: the course list, the selected course by title and the
/// remaining preferences as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSettings {
    #[serde(
        default,
        deserialize_with = "course_entries",
        skip_serializing_if = "Option::is_none"
    )]
    pub courses: Option<Vec<ExchangeRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_course: Option<String>,
    /// Copy of the top-level plan; older payloads kept it only here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree_plan: Option<DegreePlan>,
    #[serde(flatten)]
    pub preferences: ExchangeRecord,
}

/// Courses as records, or as bare titles in older payloads
fn course_entries<'de, D>(deserializer: D) -> Result<Option<Vec<ExchangeRecord>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CourseEntry {
        Title(String),
        Record(ExchangeRecord),
    }

    let entries: Option<Vec<CourseEntry>> = Option::deserialize(deserializer)?;
    Ok(entries.map(|entries| {
        entries
            .into_iter()
            .map(|entry| match entry {
                CourseEntry::Title(title) => {
                    let mut record = ExchangeRecord::new();
                    record.insert("title".to_string(), Value::String(title));
                    record
                }
                CourseEntry::Record(record) => record,
            })
            .collect()
    }))
}

impl ExchangePayload {
    /// Validate and convert an already parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, TransferError> {
        let Value::Object(object) = &value else {
            return Err(TransferError::InvalidPayload(
                "expected a JSON object at the top level".to_string(),
            ));
        };
        if !KNOWN_KEYS.iter().any(|key| object.contains_key(*key)) {
            return Err(TransferError::InvalidPayload(
                "no recognised sections in payload".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| TransferError::InvalidPayload(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Degree plan, wherever the payload keeps it
    pub fn take_degree_plan(&mut self) -> Option<DegreePlan> {
        let legacy = self.settings.as_mut().and_then(|s| s.degree_plan.take());
        self.degree_plan.take().or(legacy)
    }
}

/// Parse payload text
pub fn parse_payload(text: &str) -> Result<ExchangePayload, TransferError> {
    let value: Value = serde_json::from_str(text)?;
    ExchangePayload::from_value(value)
}

/// Exported file: the payload plus version and timestamp
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    /// RFC 3339
    pub exported_at: String,
    #[serde(flatten)]
    pub payload: ExchangePayload,
}
