//! Keyed merge of record collections
//!
//! Records are merged as JSON object views so that key and preserved
//! fields can be named per collection. Incoming records that match an
//! existing record by key keep the existing `id` and, for file imports,
//! the existing values of the preserved fields. Existing records without
//! an incoming match are dropped, so deletions propagate.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use super::payload::ExchangeRecord;
use super::{collapse_line_breaks, ImportMode};

/// How one collection is merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    /// Fields that identify the same record on both sides; empty means no
    /// record ever matches and the collection is replaced wholesale
    pub key_fields: &'static [&'static str],
    /// Local fields kept over incoming ones on a file import
    pub preserve_fields: &'static [&'static str],
}

impl MergeRule {
    pub const REPLACE: MergeRule = MergeRule {
        key_fields: &[],
        preserve_fields: &[],
    };

    pub const COURSES: MergeRule = MergeRule {
        key_fields: &["title"],
        preserve_fields: &["color"],
    };

    /// Schedule entries and timetable events
    pub const WEEKLY_SLOTS: MergeRule = MergeRule {
        key_fields: &["title", "day", "start", "end"],
        preserve_fields: &["color"],
    };

    pub const REGULAR_EVENTS: MergeRule = MergeRule {
        key_fields: &["title", "date", "start"],
        preserve_fields: &["color"],
    };

    fn key(&self, record: &ExchangeRecord) -> Option<Vec<Value>> {
        if self.key_fields.is_empty() {
            return None;
        }
        Some(
            self.key_fields
                .iter()
                .map(|field| match record.get(*field) {
                    Some(Value::String(s)) => Value::String(collapse_line_breaks(s)),
                    Some(other) => other.clone(),
                    None => Value::Null,
                })
                .collect(),
        )
    }

    /// Merge `incoming` over `existing`
    ///
    /// The result has exactly one record per incoming record, in incoming
    /// order, each with an `id` that is unique within the result.
    pub fn merge(
        &self,
        existing: &[ExchangeRecord],
        incoming: Vec<ExchangeRecord>,
        mode: ImportMode,
    ) -> MergeOutcome {
        let existing_keys: Vec<_> = existing.iter().map(|r| self.key(r)).collect();
        let mut taken = vec![false; existing.len()];

        let paired: Vec<(ExchangeRecord, Option<usize>)> = incoming
            .into_iter()
            .map(|record| {
                let matched = self.key(&record).and_then(|key| {
                    let idx = existing_keys
                        .iter()
                        .enumerate()
                        .position(|(i, k)| !taken[i] && k.as_ref() == Some(&key))?;
                    taken[idx] = true;
                    Some(idx)
                });
                (record, matched)
            })
            .collect();

        let mut used: HashSet<String> = paired
            .iter()
            .filter_map(|(_, matched)| *matched)
            .filter_map(|idx| record_id(&existing[idx]))
            .collect();

        let mut matched_count = 0;
        let records = paired
            .into_iter()
            .map(|(mut record, matched)| {
                match matched {
                    Some(idx) => {
                        matched_count += 1;
                        let local = &existing[idx];
                        if let Some(id) = local.get("id") {
                            record.insert("id".to_string(), id.clone());
                        }
                        if mode == ImportMode::File {
                            for field in self.preserve_fields {
                                if let Some(value) = local.get(*field) {
                                    record.insert(field.to_string(), value.clone());
                                }
                            }
                        }
                    }
                    None => {
                        let kept = match mode {
                            ImportMode::Sync => record_id(&record).filter(|id| !used.contains(id)),
                            ImportMode::File => None,
                        };
                        let id = kept.unwrap_or_else(|| Uuid::new_v4().to_string());
                        used.insert(id.clone());
                        record.insert("id".to_string(), Value::String(id));
                    }
                }
                record
            })
            .collect();

        MergeOutcome {
            records,
            matched: matched_count,
        }
    }
}

/// Result of merging one collection
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub records: Vec<ExchangeRecord>,
    /// How many incoming records matched an existing one
    pub matched: usize,
}

/// A record's id when it is a usable, non-nil UUID
pub(crate) fn record_id(record: &ExchangeRecord) -> Option<String> {
    let id = record.get("id")?.as_str()?;
    Uuid::parse_str(id)
        .ok()
        .filter(|uuid| !uuid.is_nil())
        .map(|uuid| uuid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ExchangeRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn ids(records: &[ExchangeRecord]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    const LOCAL_ID: &str = "6f1c1d8e-95b4-4a43-9f7a-2f8e0b5d1c11";
    const FOREIGN_ID: &str = "0b9d5f3a-1c2e-4d6f-8a7b-9c0d1e2f3a4b";

    #[test]
    fn test_file_import_preserves_id_and_color() {
        let existing = vec![record(json!({"id": LOCAL_ID, "title": "Chemistry", "color": "#ff0000"}))];
        let incoming = vec![record(json!({"id": FOREIGN_ID, "title": "Chemistry", "color": "#00ff00", "code": "CHEM101"}))];

        let outcome = MergeRule::COURSES.merge(&existing, incoming, ImportMode::File);

        assert_eq!(outcome.matched, 1);
        let merged = &outcome.records[0];
        assert_eq!(merged["id"], LOCAL_ID);
        assert_eq!(merged["color"], "#ff0000");
        assert_eq!(merged["code"], "CHEM101");
    }

    #[test]
    fn test_sync_import_keeps_id_but_takes_color() {
        let existing = vec![record(json!({"id": LOCAL_ID, "title": "Chemistry", "color": "#ff0000"}))];
        let incoming = vec![record(json!({"id": FOREIGN_ID, "title": "Chemistry", "color": "#00ff00"}))];

        let outcome = MergeRule::COURSES.merge(&existing, incoming, ImportMode::Sync);

        assert_eq!(outcome.records[0]["id"], LOCAL_ID);
        assert_eq!(outcome.records[0]["color"], "#00ff00");
    }

    #[test]
    fn test_unmatched_existing_records_are_dropped() {
        let existing = vec![
            record(json!({"id": LOCAL_ID, "title": "Lecture", "day": "Monday", "start": "09:00", "end": "10:00"})),
            record(json!({"id": FOREIGN_ID, "title": "Lab", "day": "Tuesday", "start": "14:00", "end": "16:00"})),
        ];
        let incoming = vec![record(
            json!({"title": "Lecture", "day": "Monday", "start": "09:00", "end": "10:00", "color": "#123456"}),
        )];

        let outcome = MergeRule::WEEKLY_SLOTS.merge(&existing, incoming, ImportMode::File);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(ids(&outcome.records), vec![LOCAL_ID]);
    }

    #[test]
    fn test_key_must_match_on_every_field() {
        let existing = vec![record(
            json!({"id": LOCAL_ID, "title": "Lecture", "day": "Monday", "start": "09:00", "end": "10:00", "color": "#111111"}),
        )];
        let incoming = vec![record(
            json!({"title": "Lecture", "day": "Monday", "start": "09:00", "end": "11:00", "color": "#222222"}),
        )];

        let outcome = MergeRule::WEEKLY_SLOTS.merge(&existing, incoming, ImportMode::File);

        assert_eq!(outcome.matched, 0);
        assert_ne!(outcome.records[0]["id"], LOCAL_ID);
        assert_eq!(outcome.records[0]["color"], "#222222");
    }

    #[test]
    fn test_replace_assigns_fresh_ids_on_file_import() {
        let incoming = vec![
            record(json!({"id": FOREIGN_ID, "title": "a"})),
            record(json!({"title": "b"})),
        ];

        let outcome = MergeRule::REPLACE.merge(&[], incoming, ImportMode::File);

        let ids = ids(&outcome.records);
        assert_ne!(ids[0], FOREIGN_ID);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(outcome.matched, 0);
    }

    #[test]
    fn test_sync_keeps_valid_unused_ids() {
        let incoming = vec![
            record(json!({"id": FOREIGN_ID, "title": "a"})),
            record(json!({"id": FOREIGN_ID, "title": "duplicate"})),
            record(json!({"id": "not-a-uuid", "title": "c"})),
            record(json!({"id": "00000000-0000-0000-0000-000000000000", "title": "d"})),
        ];

        let outcome = MergeRule::REPLACE.merge(&[], incoming, ImportMode::Sync);

        let ids = ids(&outcome.records);
        assert_eq!(ids[0], FOREIGN_ID);
        assert_ne!(ids[1], FOREIGN_ID);
        assert!(Uuid::parse_str(ids[2]).is_ok());
        assert_ne!(ids[3], "00000000-0000-0000-0000-000000000000");
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_foreign_id_never_collides_with_matched_id() {
        let existing = vec![record(json!({"id": LOCAL_ID, "title": "Chemistry"}))];
        let incoming = vec![
            record(json!({"id": LOCAL_ID, "title": "Physics"})),
            record(json!({"title": "Chemistry"})),
        ];

        let outcome = MergeRule::COURSES.merge(&existing, incoming, ImportMode::Sync);

        let ids = ids(&outcome.records);
        assert_eq!(ids[1], LOCAL_ID);
        assert_ne!(ids[0], LOCAL_ID);
    }

    #[test]
    fn test_line_breaks_do_not_defeat_keys() {
        let existing = vec![record(json!({"id": LOCAL_ID, "title": "Organic\nChemistry"}))];
        let incoming = vec![record(json!({"title": "Organic Chemistry"}))];

        let outcome = MergeRule::COURSES.merge(&existing, incoming, ImportMode::File);
        assert_eq!(outcome.records[0]["id"], LOCAL_ID);
    }
}
