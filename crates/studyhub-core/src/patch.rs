//! In-place recursive merge of state snapshots
//!
//! [`Patch::patch`] folds a source value into an existing one without
//! replacing the root: scalars are overwritten, structs and maps recurse,
//! and sequences are cleared and repopulated in place. Map keys that only
//! exist on the target survive.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{AppState, DegreePlan, Gradient, Settings, Wellness};

pub trait Patch {
    fn patch(&mut self, source: Self);
}

macro_rules! overwrite {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Patch for $ty {
                fn patch(&mut self, source: Self) {
                    *self = source;
                }
            }
        )*
    };
}

overwrite!(bool, u16, u32, f64, String);

impl<T> Patch for Option<T> {
    fn patch(&mut self, source: Self) {
        *self = source;
    }
}

impl<T> Patch for Vec<T> {
    fn patch(&mut self, source: Self) {
        self.clear();
        self.extend(source);
    }
}

impl<T: Ord> Patch for BTreeSet<T> {
    fn patch(&mut self, source: Self) {
        self.clear();
        self.extend(source);
    }
}

impl<K: Ord, V: Patch> Patch for BTreeMap<K, V> {
    fn patch(&mut self, source: Self) {
        for (key, value) in source {
            match self.get_mut(&key) {
                Some(existing) => existing.patch(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

macro_rules! patch_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl Patch for $ty {
            fn patch(&mut self, source: Self) {
                $(self.$field.patch(source.$field);)*
            }
        }
    };
}

patch_fields!(AppState {
    courses,
    tasks,
    exams,
    exam_grades,
    schedule,
    timetable_events,
    regular_events,
    sessions,
    session_tasks,
    weekly_goals,
    degree_plan,
    settings,
    wellness,
});

patch_fields!(Settings {
    selected_course,
    dark_mode,
    gradient,
    bg_image,
    soundtrack_embed,
    accent_color,
    card_opacity,
    weather_api_key,
    weather_location,
});

patch_fields!(Gradient { enabled, start, end, angle });

patch_fields!(Wellness {
    water,
    gratitude,
    mood_percentages,
    has_interacted,
    monthly_moods,
    show_words,
    mood_emojis,
});

patch_fields!(DegreePlan { semesters, completed_courses });
