//! Data models for StudyHub
//!
//! Defines the application state snapshot and its record types. Records
//! reference courses by [`CourseId`]; exchange payloads reference them by
//! title instead (see `transfer`).
//!
//! Dates and times are kept as the strings the user entered (`2024-05-01`,
//! `09:30`, `Monday`), since they take part in merge keys verbatim.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title of the course every fresh state starts with
pub const DEFAULT_COURSE_TITLE: &str = "General";

/// Identifier of a course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(Uuid);

impl CourseId {
    /// "No course"
    pub const UNASSIGNED: CourseId = CourseId(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A course; other records point at it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    /// Display color, e.g. `#4f46e5`
    pub color: String,
    /// Catalogue code such as `CHEM101`
    pub code: String,
}

impl Course {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: CourseId::new(),
            title: title.into(),
            color: DEFAULT_COURSE_COLOR.to_string(),
            code: String::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

const DEFAULT_COURSE_COLOR: &str = "#4f46e5";

impl Default for Course {
    fn default() -> Self {
        Self {
            id: CourseId::UNASSIGNED,
            title: String::new(),
            color: DEFAULT_COURSE_COLOR.to_string(),
            code: String::new(),
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}' (expected low, medium or high)", other)),
        }
    }
}

/// A to-do item for a course
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: Uuid,
    pub course: CourseId,
    pub title: String,
    pub due: Option<String>,
    pub priority: Priority,
    pub done: bool,
    pub notes: String,
}

impl Task {
    pub fn new(course: CourseId, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course,
            title: title.into(),
            ..Self::default()
        }
    }
}

/// An upcoming exam
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exam {
    pub id: Uuid,
    pub course: CourseId,
    pub title: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub notes: String,
}

impl Exam {
    pub fn new(course: CourseId, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course,
            title: title.into(),
            date: date.into(),
            ..Self::default()
        }
    }
}

/// A graded exam with its weight in the course average
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamGrade {
    pub id: Uuid,
    pub course: CourseId,
    pub title: String,
    pub grade: f64,
    pub weight: f64,
}

impl ExamGrade {
    pub fn new(course: CourseId, title: impl Into<String>, grade: f64, weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            course,
            title: title.into(),
            grade,
            weight,
        }
    }
}

/// A weekly recurring slot; used for both the schedule and the timetable
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub course: CourseId,
    pub title: String,
    /// Day of the week, e.g. `Monday`
    pub day: String,
    pub start: String,
    pub end: String,
    pub location: String,
    pub color: String,
}

impl ScheduleEntry {
    pub fn new(
        course: CourseId,
        title: impl Into<String>,
        day: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            course,
            title: title.into(),
            day: day.into(),
            start: start.into(),
            end: end.into(),
            ..Self::default()
        }
    }
}

/// A one-off calendar event, optionally tied to a course
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegularEvent {
    pub id: Uuid,
    pub course: Option<CourseId>,
    pub title: String,
    pub date: String,
    pub start: String,
    pub end: String,
    pub notes: String,
    pub color: String,
}

impl RegularEvent {
    pub fn new(title: impl Into<String>, date: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            date: date.into(),
            start: start.into(),
            ..Self::default()
        }
    }
}

/// A logged study session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudySession {
    pub id: Uuid,
    pub course: CourseId,
    pub date: String,
    pub minutes: u32,
    pub notes: String,
}

impl StudySession {
    pub fn new(course: CourseId, date: impl Into<String>, minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            course,
            date: date.into(),
            minutes,
            notes: String::new(),
        }
    }
}

/// A checklist item inside a study session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTask {
    pub id: Uuid,
    pub session: Uuid,
    pub course: CourseId,
    pub title: String,
    pub done: bool,
}

impl SessionTask {
    pub fn new(session: &StudySession, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: session.id,
            course: session.course,
            title: title.into(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyGoal {
    pub id: Uuid,
    pub title: String,
    pub target: u32,
    pub progress: u32,
    /// ISO week, e.g. `2024-W18`
    pub week: String,
}

impl WeeklyGoal {
    pub fn new(title: impl Into<String>, target: u32, week: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            target,
            progress: 0,
            week: week.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannedCourse {
    pub title: String,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Semester {
    pub id: Uuid,
    pub name: String,
    pub courses: Vec<PlannedCourse>,
}

/// Long-term plan of semesters and the planned courses already completed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DegreePlan {
    pub semesters: Vec<Semester>,
    /// Titles of completed planned courses
    pub completed_courses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Gradient {
    pub enabled: bool,
    pub start: String,
    pub end: String,
    /// Degrees
    pub angle: u16,
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "#6a11cb".to_string(),
            end: "#2575fc".to_string(),
            angle: 135,
        }
    }
}

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub selected_course: Option<CourseId>,
    pub dark_mode: bool,
    pub gradient: Gradient,
    pub bg_image: String,
    pub soundtrack_embed: String,
    pub accent_color: String,
    /// 0.0 (transparent) to 1.0 (opaque)
    pub card_opacity: f64,
    pub weather_api_key: String,
    pub weather_location: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_course: None,
            dark_mode: false,
            gradient: Gradient::default(),
            bg_image: String::new(),
            soundtrack_embed: String::new(),
            accent_color: DEFAULT_COURSE_COLOR.to_string(),
            card_opacity: 0.9,
            weather_api_key: String::new(),
            weather_location: String::new(),
        }
    }
}

/// Wellness tracker: water, gratitude journal, moods
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Wellness {
    /// Glasses of water today
    pub water: u32,
    #[serde(deserialize_with = "gratitude_entries")]
    pub gratitude: Vec<String>,
    /// date -> mood -> percentage
    pub mood_percentages: BTreeMap<String, BTreeMap<String, f64>>,
    pub has_interacted: bool,
    /// date -> mood
    pub monthly_moods: BTreeMap<String, String>,
    pub show_words: bool,
    /// mood -> emoji
    pub mood_emojis: BTreeMap<String, String>,
}

/// Accept a list of entries or a single legacy string
fn gratitude_entries<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entries {
        List(Vec<String>),
        Single(String),
        Missing(()),
    }

    Ok(match Entries::deserialize(deserializer)? {
        Entries::List(list) => list,
        Entries::Single(s) if s.trim().is_empty() => Vec::new(),
        Entries::Single(s) => vec![s],
        Entries::Missing(()) => Vec::new(),
    })
}

/// The whole application state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub courses: Vec<Course>,
    pub tasks: Vec<Task>,
    pub exams: Vec<Exam>,
    pub exam_grades: Vec<ExamGrade>,
    pub schedule: Vec<ScheduleEntry>,
    pub timetable_events: Vec<ScheduleEntry>,
    pub regular_events: Vec<RegularEvent>,
    pub sessions: Vec<StudySession>,
    pub session_tasks: Vec<SessionTask>,
    pub weekly_goals: Vec<WeeklyGoal>,
    pub degree_plan: DegreePlan,
    pub settings: Settings,
    pub wellness: Wellness,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            courses: vec![Course::new(DEFAULT_COURSE_TITLE)],
            tasks: Vec::new(),
            exams: Vec::new(),
            exam_grades: Vec::new(),
            schedule: Vec::new(),
            timetable_events: Vec::new(),
            regular_events: Vec::new(),
            sessions: Vec::new(),
            session_tasks: Vec::new(),
            weekly_goals: Vec::new(),
            degree_plan: DegreePlan::default(),
            settings: Settings::default(),
            wellness: Wellness::default(),
        }
    }
}

impl AppState {
    /// Course with this id
    pub fn course(&self, id: CourseId) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// First course whose title matches exactly
    pub fn course_by_title(&self, title: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.title == title)
    }

    /// Course that stands in for unknown or dangling references
    pub fn fallback_course(&self) -> Option<&Course> {
        self.courses.first()
    }
}
