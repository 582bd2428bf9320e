//! State to exchange payload

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::collapse_line_breaks;
use super::payload::{ExchangePayload, ExchangeRecord, ExchangeSettings, ExportDocument, EXPORT_VERSION};
use crate::models::{AppState, CourseId, DegreePlan, Wellness};

/// Free-text fields flattened to a single line on export
const TEXT_FIELDS: &[&str] = &["title", "notes", "location"];

/// Resolves course ids to the titles written into payloads
struct CourseTitles<'a> {
    state: &'a AppState,
    fallback: String,
}

impl<'a> CourseTitles<'a> {
    fn new(state: &'a AppState) -> Self {
        let fallback = state
            .fallback_course()
            .map(|c| collapse_line_breaks(&c.title))
            .unwrap_or_default();
        Self { state, fallback }
    }

    /// Title of `id`; unassigned or dangling ids get the fallback title
    fn title(&self, id: CourseId) -> String {
        match self.state.course(id) {
            Some(course) => collapse_line_breaks(&course.title),
            None => self.fallback.clone(),
        }
    }
}

fn record_view<T: Serialize>(record: &T) -> ExchangeRecord {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => ExchangeRecord::new(),
    }
}

fn flatten_text(record: &mut ExchangeRecord) {
    for field in TEXT_FIELDS {
        if let Some(Value::String(text)) = record.get_mut(*field) {
            *text = collapse_line_breaks(text);
        }
    }
}

/// Export a collection whose records always name a course
fn with_course<T: Serialize>(
    records: &[T],
    course_of: impl Fn(&T) -> CourseId,
    titles: &CourseTitles<'_>,
) -> Vec<ExchangeRecord> {
    records
        .iter()
        .map(|record| {
            let mut view = record_view(record);
            view.insert(
                "course".to_string(),
                Value::String(titles.title(course_of(record))),
            );
            flatten_text(&mut view);
            view
        })
        .collect()
}

fn without_course<T: Serialize>(records: &[T]) -> Vec<ExchangeRecord> {
    records
        .iter()
        .map(|record| {
            let mut view = record_view(record);
            flatten_text(&mut view);
            view
        })
        .collect()
}

fn export_settings(state: &AppState, titles: &CourseTitles<'_>) -> ExchangeSettings {
    let courses = without_course(&state.courses);

    let mut preferences = record_view(&state.settings);
    preferences.remove("selectedCourse");

    let selected_course = state
        .settings
        .selected_course
        .and_then(|id| state.course(id))
        .map(|course| titles.title(course.id));

    ExchangeSettings {
        courses: Some(courses),
        selected_course,
        degree_plan: Some(export_degree_plan(&state.degree_plan)),
        preferences,
    }
}

fn export_wellness(wellness: &Wellness) -> Wellness {
    let mut wellness = wellness.clone();
    for entry in &mut wellness.gratitude {
        *entry = collapse_line_breaks(entry);
    }
    wellness
}

fn export_degree_plan(plan: &DegreePlan) -> DegreePlan {
    let mut plan = plan.clone();
    for semester in &mut plan.semesters {
        for course in &mut semester.courses {
            course.title = collapse_line_breaks(&course.title);
        }
    }
    plan.completed_courses = plan
        .completed_courses
        .iter()
        .map(|title| collapse_line_breaks(title))
        .collect();
    plan
}

/// Build the exchange payload for a state
///
/// Every section is present so that an import replaces the whole state.
pub fn export_payload(state: &AppState) -> ExchangePayload {
    let titles = CourseTitles::new(state);

    let regular_events = state
        .regular_events
        .iter()
        .map(|event| {
            let mut view = record_view(event);
            match event.course {
                Some(id) => {
                    view.insert("course".to_string(), Value::String(titles.title(id)));
                }
                None => {
                    view.remove("course");
                }
            }
            flatten_text(&mut view);
            view
        })
        .collect();

    ExchangePayload {
        sessions: Some(with_course(&state.sessions, |s| s.course, &titles)),
        exams: Some(with_course(&state.exams, |e| e.course, &titles)),
        exam_grades: Some(with_course(&state.exam_grades, |g| g.course, &titles)),
        tasks: Some(with_course(&state.tasks, |t| t.course, &titles)),
        schedule: Some(with_course(&state.schedule, |e| e.course, &titles)),
        timetable_events: Some(with_course(&state.timetable_events, |e| e.course, &titles)),
        regular_events: Some(regular_events),
        session_tasks: Some(with_course(&state.session_tasks, |t| t.course, &titles)),
        weekly_goals: Some(without_course(&state.weekly_goals)),
        degree_plan: Some(export_degree_plan(&state.degree_plan)),
        wellness: Some(export_wellness(&state.wellness)),
        settings: Some(export_settings(state, &titles)),
    }
}

/// Build the document written by a file export
pub fn export_document(state: &AppState) -> ExportDocument {
    ExportDocument {
        version: EXPORT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        payload: export_payload(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Course, RegularEvent, Task};

    fn state_with_chemistry() -> (AppState, CourseId) {
        let mut state = AppState::default();
        let chem = Course::new("Chemistry");
        let id = chem.id;
        state.courses.push(chem);
        (state, id)
    }

    #[test]
    fn test_course_ids_become_titles() {
        let (mut state, chem) = state_with_chemistry();
        state.tasks.push(Task::new(chem, "Lab report"));

        let payload = export_payload(&state);
        let tasks = payload.tasks.unwrap();
        assert_eq!(tasks[0]["course"], "Chemistry");
        assert_eq!(tasks[0]["title"], "Lab report");
    }

    #[test]
    fn test_dangling_course_exports_fallback_title() {
        let mut state = AppState::default();
        state.tasks.push(Task::new(CourseId::new(), "Orphan"));
        state.tasks.push(Task::new(CourseId::UNASSIGNED, "Unassigned"));

        let tasks = export_payload(&state).tasks.unwrap();
        assert_eq!(tasks[0]["course"], "General");
        assert_eq!(tasks[1]["course"], "General");
    }

    #[test]
    fn test_no_courses_exports_empty_title() {
        let mut state = AppState::default();
        state.courses.clear();
        state.tasks.push(Task::new(CourseId::new(), "Orphan"));

        let tasks = export_payload(&state).tasks.unwrap();
        assert_eq!(tasks[0]["course"], "");
    }

    #[test]
    fn test_line_breaks_collapse_to_spaces() {
        let (mut state, chem) = state_with_chemistry();
        let mut task = Task::new(chem, "Line one\r\nline two\rline three\nend");
        task.notes = "a\n\nb".to_string();
        state.tasks.push(task);
        state.wellness.gratitude.push("good\nday".to_string());

        let payload = export_payload(&state);
        let tasks = payload.tasks.unwrap();
        assert_eq!(tasks[0]["title"], "Line one line two line three end");
        assert_eq!(tasks[0]["notes"], "a  b");
        assert_eq!(payload.wellness.unwrap().gratitude, vec!["good day".to_string()]);
    }

    #[test]
    fn test_regular_event_without_course_omits_field() {
        let (mut state, chem) = state_with_chemistry();
        state.regular_events.push(RegularEvent::new("Party", "2024-05-01", "20:00"));
        let mut linked = RegularEvent::new("Review", "2024-05-02", "10:00");
        linked.course = Some(chem);
        state.regular_events.push(linked);

        let events = export_payload(&state).regular_events.unwrap();
        assert!(!events[0].contains_key("course"));
        assert_eq!(events[1]["course"], "Chemistry");
    }

    #[test]
    fn test_settings_carry_courses_and_selected_title() {
        let (mut state, chem) = state_with_chemistry();
        state.settings.selected_course = Some(chem);
        state.settings.dark_mode = true;

        let settings = export_payload(&state).settings.unwrap();
        let courses = settings.courses.unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[1]["title"], "Chemistry");
        assert_eq!(settings.selected_course.as_deref(), Some("Chemistry"));
        assert_eq!(settings.preferences["darkMode"], true);
        assert!(!settings.preferences.contains_key("selectedCourse"));
    }

    #[test]
    fn test_settings_repeat_degree_plan() {
        let mut state = AppState::default();
        state
            .degree_plan
            .completed_courses
            .insert("Calculus I".to_string());

        let json = export_payload(&state).to_value();
        assert_eq!(json["settings"]["degreePlan"], json["degreePlan"]);
        assert_eq!(json["settings"]["degreePlan"]["completedCourses"][0], "Calculus I");

        let document = serde_json::to_value(export_document(&state)).unwrap();
        assert_eq!(document["settings"]["degreePlan"], document["degreePlan"]);
    }

    #[test]
    fn test_export_document_has_version_and_timestamp() {
        let document = export_document(&AppState::default());
        assert_eq!(document.version, EXPORT_VERSION);
        assert!(chrono::DateTime::parse_from_rfc3339(&document.exported_at).is_ok());
    }
}
