//! Exchange payload into live state
//!
//! Courses merge first, so that the course titles in every other record can
//! be resolved to local ids. The state is only replaced once every section
//! has been converted; a failing payload leaves it untouched.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::merge::{record_id, MergeRule};
use super::payload::{ExchangePayload, ExchangeRecord, ExchangeSettings};
use super::{ImportMode, ImportSummary, TransferError};
use crate::models::{AppState, Course, CourseId, Settings};

/// How a collection refers to courses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CourseRef {
    Required,
    Optional,
    Absent,
}

fn views<T: Serialize>(records: &[T]) -> Vec<ExchangeRecord> {
    records
        .iter()
        .filter_map(|r| match serde_json::to_value(r) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect()
}

fn typed<T: DeserializeOwned>(
    section: &str,
    records: Vec<ExchangeRecord>,
) -> Result<Vec<T>, TransferError> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            serde_json::from_value(Value::Object(record)).map_err(|e| {
                TransferError::InvalidPayload(format!("{}[{}]: {}", section, i, e))
            })
        })
        .collect()
}

/// Resolves course titles against the merged course list
struct CourseResolver<'a> {
    courses: &'a [Course],
    fallbacks: usize,
}

impl<'a> CourseResolver<'a> {
    fn new(courses: &'a [Course]) -> Self {
        Self {
            courses,
            fallbacks: 0,
        }
    }

    fn by_title(&self, title: &str) -> Option<CourseId> {
        self.courses.iter().find(|c| c.title == title).map(|c| c.id)
    }

    /// Local id for `title`, or the first course when it is unknown
    fn resolve(&mut self, title: Option<&str>) -> CourseId {
        if let Some(id) = title.and_then(|t| self.by_title(t)) {
            return id;
        }
        self.fallbacks += 1;
        let fallback = self
            .courses
            .first()
            .map(|c| c.id)
            .unwrap_or(CourseId::UNASSIGNED);
        debug!(
            "Unknown course {:?}, assigning fallback course {}",
            title, fallback
        );
        fallback
    }

    fn rewrite(&mut self, record: &mut ExchangeRecord, kind: CourseRef) {
        let title = match record.get("course") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        let resolved = match (kind, title) {
            (CourseRef::Absent, _) => return,
            (CourseRef::Optional, None) => Value::Null,
            (_, title) => Value::String(self.resolve(title.as_deref()).to_string()),
        };
        record.insert("course".to_string(), resolved);
    }
}

struct Importer<'a> {
    mode: ImportMode,
    summary: &'a mut ImportSummary,
}

impl Importer<'_> {
    /// Merge one collection and convert it back to typed records
    fn collection<T: Serialize + DeserializeOwned>(
        &mut self,
        section: &str,
        existing: &[T],
        incoming: Vec<ExchangeRecord>,
        rule: MergeRule,
    ) -> Result<Vec<T>, TransferError> {
        self.summary.records += incoming.len();
        let outcome = rule.merge(&views(existing), incoming, self.mode);
        self.summary.matched += outcome.matched;
        typed(section, outcome.records)
    }
}

fn import_settings(
    next: &mut AppState,
    settings: ExchangeSettings,
    importer: &mut Importer<'_>,
) -> Result<(), TransferError> {
    if let Some(courses) = settings.courses {
        importer.summary.courses = courses.len();
        next.courses = importer.collection("courses", &next.courses, courses, MergeRule::COURSES)?;
    }

    if settings.preferences.is_empty() && settings.selected_course.is_none() {
        return Ok(());
    }

    let mut preferences: Settings = serde_json::from_value(Value::Object(settings.preferences))
        .map_err(|e| TransferError::InvalidPayload(format!("settings: {}", e)))?;
    preferences.selected_course = settings
        .selected_course
        .and_then(|title| next.course_by_title(&title).map(|c| c.id));
    next.settings = preferences;
    Ok(())
}

/// Merge `payload` into `state`
///
/// On error `state` is unchanged.
pub fn import_payload(
    state: &mut AppState,
    mut payload: ExchangePayload,
    mode: ImportMode,
) -> Result<ImportSummary, TransferError> {
    let mut next = state.clone();
    let mut summary = ImportSummary::default();
    let degree_plan = payload.take_degree_plan();
    let mut importer = Importer {
        mode,
        summary: &mut summary,
    };

    if let Some(settings) = payload.settings.take() {
        import_settings(&mut next, settings, &mut importer)?;
    }

    let courses = next.courses.clone();
    let mut resolver = CourseResolver::new(&courses);
    let mut resolve = |records: Option<Vec<ExchangeRecord>>, kind: CourseRef| {
        records.map(|mut records| {
            for record in &mut records {
                resolver.rewrite(record, kind);
            }
            records
        })
    };

    let sessions = resolve(payload.sessions, CourseRef::Required);
    let exams = resolve(payload.exams, CourseRef::Required);
    let exam_grades = resolve(payload.exam_grades, CourseRef::Required);
    let tasks = resolve(payload.tasks, CourseRef::Required);
    let schedule = resolve(payload.schedule, CourseRef::Required);
    let timetable_events = resolve(payload.timetable_events, CourseRef::Required);
    let regular_events = resolve(payload.regular_events, CourseRef::Optional);
    let session_tasks = resolve(payload.session_tasks, CourseRef::Required);
    let weekly_goals = resolve(payload.weekly_goals, CourseRef::Absent);
    importer.summary.fallback_courses = resolver.fallbacks;

    let mut session_ids: HashMap<String, Value> = HashMap::new();
    if let Some(incoming) = sessions {
        let original: Vec<Option<String>> = incoming.iter().map(record_id).collect();
        let merged = MergeRule::REPLACE.merge(&views(&next.sessions), incoming, mode);
        for (old, record) in original.into_iter().zip(&merged.records) {
            if let (Some(old), Some(new)) = (old, record.get("id")) {
                session_ids.insert(old, new.clone());
            }
        }
        importer.summary.records += merged.records.len();
        next.sessions = typed("sessions", merged.records)?;
    }

    if let Some(mut incoming) = session_tasks {
        for record in &mut incoming {
            let remapped = record
                .get("session")
                .and_then(Value::as_str)
                .and_then(|old| uuid::Uuid::parse_str(old).ok())
                .and_then(|old| session_ids.get(&old.to_string()))
                .cloned();
            if let Some(new) = remapped {
                record.insert("session".to_string(), new);
            }
        }
        next.session_tasks =
            importer.collection("sessionTasks", &next.session_tasks, incoming, MergeRule::REPLACE)?;
    }

    if let Some(incoming) = exams {
        next.exams = importer.collection("exams", &next.exams, incoming, MergeRule::REPLACE)?;
    }
    if let Some(incoming) = exam_grades {
        next.exam_grades =
            importer.collection("examGrades", &next.exam_grades, incoming, MergeRule::REPLACE)?;
    }
    if let Some(incoming) = tasks {
        next.tasks = importer.collection("tasks", &next.tasks, incoming, MergeRule::REPLACE)?;
    }
    if let Some(incoming) = schedule {
        next.schedule =
            importer.collection("schedule", &next.schedule, incoming, MergeRule::WEEKLY_SLOTS)?;
    }
    if let Some(incoming) = timetable_events {
        next.timetable_events = importer.collection(
            "timetableEvents",
            &next.timetable_events,
            incoming,
            MergeRule::WEEKLY_SLOTS,
        )?;
    }
    if let Some(incoming) = regular_events {
        next.regular_events = importer.collection(
            "regularEvents",
            &next.regular_events,
            incoming,
            MergeRule::REGULAR_EVENTS,
        )?;
    }
    if let Some(incoming) = weekly_goals {
        next.weekly_goals =
            importer.collection("weeklyGoals", &next.weekly_goals, incoming, MergeRule::REPLACE)?;
    }

    if let Some(plan) = degree_plan {
        next.degree_plan = plan;
    }
    if let Some(wellness) = payload.wellness {
        next.wellness = wellness;
    }

    *state = next;
    Ok(summary)
}
