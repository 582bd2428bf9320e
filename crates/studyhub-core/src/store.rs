//! Reactive state store
//!
//! The `Store` owns the [`AppState`] root of one context and notifies its
//! subscribers synchronously after every mutation. All data access goes
//! through it; persistence is a subscriber like any other (see `sync`).
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::new();
//! let id = store.subscribe(|event, state| println!("{:?}: {} tasks", event, state.tasks.len()));
//!
//! let course = store.state().courses[0].id;
//! store.add(Task::new(course, "Read chapter 3"));
//! ```

use uuid::Uuid;

use crate::models::{
    AppState, Course, CourseId, DegreePlan, Exam, ExamGrade, RegularEvent, ScheduleEntry,
    SessionTask, Settings, StudySession, Task, WeeklyGoal, Wellness,
};
use crate::patch::Patch;

/// Part of the state touched by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Courses,
    Tasks,
    Exams,
    ExamGrades,
    Schedule,
    TimetableEvents,
    RegularEvents,
    Sessions,
    SessionTasks,
    WeeklyGoals,
    DegreePlan,
    Settings,
    Wellness,
}

/// What changed in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A data-access operation changed one section
    Changed(Section),
    /// A whole snapshot was merged in with [`Store::patch_state`]
    Patched,
}

impl StoreEvent {
    pub fn touches(&self, section: Section) -> bool {
        match self {
            StoreEvent::Changed(s) => *s == section,
            StoreEvent::Patched => true,
        }
    }
}

/// Callback run after each mutation
pub type StoreCallback = Box<dyn Fn(&StoreEvent, &AppState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    section: Option<Section>,
    callback: StoreCallback,
}

/// A record kept in one of the state's collections
pub trait Record: Clone {
    type Id: Copy + PartialEq;

    const SECTION: Section;

    fn id(&self) -> Self::Id;

    fn collection(state: &AppState) -> &Vec<Self>;

    fn collection_mut(state: &mut AppState) -> &mut Vec<Self>;
}

macro_rules! record {
    ($ty:ty, $id:ty, $section:ident, $field:ident) => {
        impl Record for $ty {
            type Id = $id;

            const SECTION: Section = Section::$section;

            fn id(&self) -> $id {
                self.id
            }

            fn collection(state: &AppState) -> &Vec<Self> {
                &state.$field
            }

            fn collection_mut(state: &mut AppState) -> &mut Vec<Self> {
                &mut state.$field
            }
        }
    };
}

record!(Course, CourseId, Courses, courses);
record!(Task, Uuid, Tasks, tasks);
record!(Exam, Uuid, Exams, exams);
record!(ExamGrade, Uuid, ExamGrades, exam_grades);
record!(RegularEvent, Uuid, RegularEvents, regular_events);
record!(StudySession, Uuid, Sessions, sessions);
record!(SessionTask, Uuid, SessionTasks, session_tasks);
record!(WeeklyGoal, Uuid, WeeklyGoals, weekly_goals);

/// Application state plus its subscribers
pub struct Store {
    state: AppState,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Store holding the default state
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    // ==================== Subscriptions ====================

    /// Run `callback` after every mutation
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent, &AppState) + Send + Sync + 'static,
    {
        self.register(None, Box::new(callback))
    }

    /// Run `callback` after mutations touching `section`
    pub fn subscribe_section<F>(&mut self, section: Section, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent, &AppState) + Send + Sync + 'static,
    {
        self.register(Some(section), Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    fn register(&mut self, section: Option<Section>, callback: StoreCallback) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            section,
            callback,
        });
        id
    }

    fn notify(&self, event: StoreEvent) {
        for subscriber in &self.subscribers {
            let wanted = subscriber.section.map_or(true, |s| event.touches(s));
            if wanted {
                (subscriber.callback)(&event, &self.state);
            }
        }
    }

    /// Apply `f` to the state, then notify once
    fn mutate<T>(&mut self, section: Section, f: impl FnOnce(&mut AppState) -> T) -> T {
        let result = f(&mut self.state);
        self.notify(StoreEvent::Changed(section));
        result
    }

    // ==================== Record Operations ====================

    /// Append a record, returning its id
    pub fn add<R: Record>(&mut self, record: R) -> R::Id {
        let id = record.id();
        self.mutate(R::SECTION, |state| R::collection_mut(state).push(record));
        id
    }

    /// Replace the record with the same id
    ///
    /// Returns false, without notifying, when no such record exists.
    pub fn update<R: Record>(&mut self, record: R) -> bool {
        let Some(pos) = self.position::<R>(record.id()) else {
            return false;
        };
        self.mutate(R::SECTION, |state| R::collection_mut(state)[pos] = record);
        true
    }

    /// Remove a record by id
    ///
    /// Removing a course does not touch records that reference it.
    pub fn remove<R: Record>(&mut self, id: R::Id) -> Option<R> {
        let pos = self.position::<R>(id)?;
        Some(self.mutate(R::SECTION, |state| R::collection_mut(state).remove(pos)))
    }

    pub fn get<R: Record>(&self, id: R::Id) -> Option<&R> {
        R::collection(&self.state).iter().find(|r| r.id() == id)
    }

    pub fn list<R: Record>(&self) -> &[R] {
        R::collection(&self.state)
    }

    fn position<R: Record>(&self, id: R::Id) -> Option<usize> {
        R::collection(&self.state).iter().position(|r| r.id() == id)
    }

    // ==================== Schedule Operations ====================

    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.state.schedule
    }

    pub fn timetable_events(&self) -> &[ScheduleEntry] {
        &self.state.timetable_events
    }

    pub fn add_schedule_entry(&mut self, entry: ScheduleEntry) -> Uuid {
        let id = entry.id;
        self.mutate(Section::Schedule, |state| state.schedule.push(entry));
        id
    }

    pub fn update_schedule_entry(&mut self, entry: ScheduleEntry) -> bool {
        self.replace_slot(Section::Schedule, entry)
    }

    pub fn remove_schedule_entry(&mut self, id: Uuid) -> Option<ScheduleEntry> {
        self.remove_slot(Section::Schedule, id)
    }

    pub fn add_timetable_event(&mut self, entry: ScheduleEntry) -> Uuid {
        let id = entry.id;
        self.mutate(Section::TimetableEvents, |state| state.timetable_events.push(entry));
        id
    }

    pub fn update_timetable_event(&mut self, entry: ScheduleEntry) -> bool {
        self.replace_slot(Section::TimetableEvents, entry)
    }

    pub fn remove_timetable_event(&mut self, id: Uuid) -> Option<ScheduleEntry> {
        self.remove_slot(Section::TimetableEvents, id)
    }

    fn slots(&self, section: Section) -> &[ScheduleEntry] {
        match section {
            Section::TimetableEvents => &self.state.timetable_events,
            _ => &self.state.schedule,
        }
    }

    fn slots_mut(state: &mut AppState, section: Section) -> &mut Vec<ScheduleEntry> {
        match section {
            Section::TimetableEvents => &mut state.timetable_events,
            _ => &mut state.schedule,
        }
    }

    fn replace_slot(&mut self, section: Section, entry: ScheduleEntry) -> bool {
        let Some(pos) = self.slots(section).iter().position(|e| e.id == entry.id) else {
            return false;
        };
        self.mutate(section, |state| Self::slots_mut(state, section)[pos] = entry);
        true
    }

    fn remove_slot(&mut self, section: Section, id: Uuid) -> Option<ScheduleEntry> {
        let pos = self.slots(section).iter().position(|e| e.id == id)?;
        Some(self.mutate(section, |state| Self::slots_mut(state, section).remove(pos)))
    }

    // ==================== Section Operations ====================

    pub fn update_settings(&mut self, f: impl FnOnce(&mut Settings)) {
        self.mutate(Section::Settings, |state| f(&mut state.settings));
    }

    pub fn update_wellness(&mut self, f: impl FnOnce(&mut Wellness)) {
        self.mutate(Section::Wellness, |state| f(&mut state.wellness));
    }

    pub fn update_degree_plan(&mut self, f: impl FnOnce(&mut DegreePlan)) {
        self.mutate(Section::DegreePlan, |state| f(&mut state.degree_plan));
    }

    pub fn select_course(&mut self, course: Option<CourseId>) {
        self.update_settings(|settings| settings.selected_course = course);
    }

    /// Record the share of `mood` on `date`, in percent
    pub fn record_mood(&mut self, date: &str, mood: &str, percentage: f64) {
        self.update_wellness(|wellness| {
            wellness
                .mood_percentages
                .entry(date.to_string())
                .or_default()
                .insert(mood.to_string(), percentage.clamp(0.0, 100.0));
            wellness.has_interacted = true;
        });
    }

    pub fn add_water(&mut self, glasses: u32) {
        self.update_wellness(|wellness| {
            wellness.water = wellness.water.saturating_add(glasses);
            wellness.has_interacted = true;
        });
    }

    /// Mark a planned course completed, or not completed again
    ///
    /// Returns whether the course is completed afterwards.
    pub fn toggle_completed_course(&mut self, title: &str) -> bool {
        let mut completed = false;
        self.update_degree_plan(|plan| {
            if !plan.completed_courses.remove(title) {
                plan.completed_courses.insert(title.to_string());
                completed = true;
            }
        });
        completed
    }

    // ==================== Snapshots ====================

    /// Merge a whole snapshot into the live state
    ///
    /// The root is kept and patched recursively; subscribers see a single
    /// [`StoreEvent::Patched`].
    pub fn patch_state(&mut self, snapshot: AppState) {
        self.state.patch(snapshot);
        self.notify(StoreEvent::Patched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(store: &mut Store) -> Arc<Mutex<Vec<StoreEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event, _| sink.lock().unwrap().push(*event));
        events
    }

    #[test]
    fn test_add_get_list() {
        let mut store = Store::new();
        let course = store.state().courses[0].id;

        let id = store.add(Task::new(course, "Essay"));
        assert_eq!(store.get::<Task>(id).unwrap().title, "Essay");
        assert_eq!(store.list::<Task>().len(), 1);
        assert_eq!(store.list::<Course>().len(), 1);
    }

    #[test]
    fn test_subscribers_see_post_mutation_state() {
        let mut store = Store::new();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        store.subscribe(move |_, state| sink.lock().unwrap().push(state.tasks.len()));

        let course = store.state().courses[0].id;
        store.add(Task::new(course, "One"));
        store.add(Task::new(course, "Two"));

        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_update_and_remove() {
        let mut store = Store::new();
        let course = store.state().courses[0].id;
        let mut task = Task::new(course, "Essay");
        store.add(task.clone());
        let events = recorder(&mut store);

        task.done = true;
        assert!(store.update(task.clone()));
        assert!(store.get::<Task>(task.id).unwrap().done);

        assert!(!store.update(Task::new(course, "missing")));
        assert_eq!(store.remove::<Task>(task.id).unwrap().title, "Essay");
        assert!(store.remove::<Task>(task.id).is_none());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                StoreEvent::Changed(Section::Tasks),
                StoreEvent::Changed(Section::Tasks)
            ]
        );
    }

    #[test]
    fn test_removing_course_does_not_cascade() {
        let mut store = Store::new();
        let chem = store.add(Course::new("Chemistry"));
        let task = store.add(Task::new(chem, "Lab report"));

        store.remove::<Course>(chem);
        assert_eq!(store.get::<Task>(task).unwrap().course, chem);
    }

    #[test]
    fn test_section_subscription_filters() {
        let mut store = Store::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        store.subscribe_section(Section::Wellness, move |_, _| *counter.lock().unwrap() += 1);

        store.add(Course::new("Biology"));
        store.add_water(2);
        store.patch_state(AppState::default());

        assert_eq!(*hits.lock().unwrap(), 2);
        assert_eq!(store.state().wellness.water, 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut store = Store::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let id = store.subscribe(move |_, _| *counter.lock().unwrap() += 1);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.add_water(1);
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn test_schedule_and_timetable_are_separate() {
        let mut store = Store::new();
        let course = store.state().courses[0].id;
        let slot = ScheduleEntry::new(course, "Lecture", "Monday", "09:00", "10:30");

        store.add_schedule_entry(slot.clone());
        assert!(store.timetable_events().is_empty());
        assert!(!store.update_timetable_event(slot.clone()));

        store.add_timetable_event(slot.clone());
        assert!(store.remove_schedule_entry(slot.id).is_some());
        assert_eq!(store.timetable_events().len(), 1);
        assert!(store.schedule().is_empty());
    }

    #[test]
    fn test_wellness_and_degree_plan_helpers() {
        let mut store = Store::new();
        store.record_mood("2024-05-01", "happy", 140.0);
        store.add_water(3);

        let wellness = &store.state().wellness;
        assert_eq!(wellness.mood_percentages["2024-05-01"]["happy"], 100.0);
        assert_eq!(wellness.water, 3);
        assert!(wellness.has_interacted);

        assert!(store.toggle_completed_course("Calculus I"));
        assert!(!store.toggle_completed_course("Calculus I"));
        assert!(store.state().degree_plan.completed_courses.is_empty());
    }

    #[test]
    fn test_patch_state_keeps_subscribers_and_emits_once() {
        let mut store = Store::new();
        let events = recorder(&mut store);

        let mut snapshot = AppState::default();
        snapshot.settings.dark_mode = true;
        let course = snapshot.courses[0].id;
        snapshot.tasks.push(Task::new(course, "Imported"));

        store.patch_state(snapshot.clone());

        assert_eq!(store.state(), &snapshot);
        assert_eq!(*events.lock().unwrap(), vec![StoreEvent::Patched]);
    }

    #[test]
    fn test_select_course() {
        let mut store = Store::new();
        let course = store.state().courses[0].id;
        store.select_course(Some(course));
        assert_eq!(store.state().settings.selected_course, Some(course));
    }
}
