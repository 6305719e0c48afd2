//! Per-path event merging.
//!
//! Events of one chunk are grouped by `(storage, path)`, ordered by producer
//! timestamp and folded through [`MERGE_TABLE`] into one net event, or none
//! when the history cancels out.

use std::collections::BTreeMap;

use crate::event::{EventRecord, EventType};

/// Outcome of folding one incoming event into the current net event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The incoming event becomes the net event.
    Replace,
    /// The current net event is kept.
    Retain,
    /// Both events vanish; the fold restarts from nothing.
    Cancel,
}

/// Pattern over the current (optional) or incoming event type.
#[derive(Debug, Clone, Copy)]
pub enum TypeMatcher {
    /// No current event.
    Nothing,
    /// Any event type, or nothing.
    Any,
    /// One of the listed types.
    OneOf(&'static [EventType]),
}

impl TypeMatcher {
    fn matches(self, event_type: Option<EventType>) -> bool {
        match self {
            Self::Nothing => event_type.is_none(),
            Self::Any => true,
            Self::OneOf(types) => event_type.is_some_and(|kind| types.contains(&kind)),
        }
    }
}

/// One row of the merge table.
#[derive(Debug, Clone, Copy)]
pub struct MergeRule {
    /// Pattern for the current net event.
    pub current: TypeMatcher,
    /// Pattern for the incoming event.
    pub incoming: TypeMatcher,
    /// Resulting transition.
    pub transition: Transition,
}

/// Merge rules; the first matching row wins.
pub const MERGE_TABLE: &[MergeRule] = &[
    MergeRule {
        current: TypeMatcher::Nothing,
        incoming: TypeMatcher::Any,
        transition: Transition::Replace,
    },
    MergeRule {
        current: TypeMatcher::OneOf(&[EventType::Created]),
        incoming: TypeMatcher::OneOf(&[EventType::MovedFrom, EventType::Deleted]),
        transition: Transition::Cancel,
    },
    MergeRule {
        current: TypeMatcher::OneOf(&[EventType::Created]),
        incoming: TypeMatcher::Any,
        transition: Transition::Retain,
    },
    MergeRule {
        current: TypeMatcher::Any,
        incoming: TypeMatcher::Any,
        transition: Transition::Replace,
    },
];

/// Looks up the transition for a pair of event types.
#[must_use]
pub fn transition(current: Option<EventType>, incoming: EventType) -> Transition {
    MERGE_TABLE
        .iter()
        .find(|rule| rule.current.matches(current) && rule.incoming.matches(Some(incoming)))
        .map_or(Transition::Replace, |rule| rule.transition)
}

/// Folds the history of one path into its net event.
///
/// Events are stably sorted by timestamp first, so equal timestamps keep
/// their input order.
#[must_use]
pub fn merge_group(mut events: Vec<EventRecord>) -> Option<EventRecord> {
    events.sort_by_key(|event| event.timestamp);
    events.into_iter().fold(None, |current, incoming| {
        match transition(current.as_ref().map(|e| e.event_type), incoming.event_type) {
            Transition::Replace => Some(incoming),
            Transition::Retain => current,
            Transition::Cancel => None,
        }
    })
}

/// Merges all events of a chunk into one net event per `(storage, path)`.
///
/// The output is ordered by storage, then path.
#[must_use]
pub fn merge_events(events: impl IntoIterator<Item = EventRecord>) -> Vec<EventRecord> {
    let mut groups: BTreeMap<(String, String), Vec<EventRecord>> = BTreeMap::new();
    for event in events {
        groups
            .entry((event.storage_id.clone(), event.path.clone()))
            .or_default()
            .push(event);
    }
    groups.into_values().filter_map(merge_group).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ev(timestamp: i64, event_type: EventType) -> EventRecord {
        EventRecord::new(timestamp, event_type, "fs", "a.txt")
    }

    #[test]
    fn table_matches_documented_rules() {
        for incoming in EventType::ALL {
            assert_eq!(transition(None, incoming), Transition::Replace);
        }
        assert_eq!(
            transition(Some(EventType::Created), EventType::Deleted),
            Transition::Cancel
        );
        assert_eq!(
            transition(Some(EventType::Created), EventType::MovedFrom),
            Transition::Cancel
        );
        assert_eq!(
            transition(Some(EventType::Created), EventType::Modified),
            Transition::Retain
        );
        assert_eq!(
            transition(Some(EventType::MovedTo), EventType::Deleted),
            Transition::Replace
        );
    }

    #[test]
    fn create_then_delete_cancels() {
        let merged = merge_group(vec![ev(1, EventType::Created), ev(2, EventType::Deleted)]);
        assert_eq!(merged, None);
    }

    #[test]
    fn latest_wins_without_create() {
        let merged = merge_group(vec![ev(2, EventType::Deleted), ev(1, EventType::Modified)]);
        assert_eq!(merged, Some(ev(2, EventType::Deleted)));
    }

    #[test]
    fn create_survives_modifications() {
        let merged = merge_group(vec![
            ev(3, EventType::Modified),
            ev(1, EventType::Created),
            ev(2, EventType::Modified),
        ]);
        assert_eq!(merged, Some(ev(1, EventType::Created)));
    }

    #[test]
    fn cancelled_group_restarts_from_nothing() {
        let merged = merge_group(vec![
            ev(1, EventType::Created),
            ev(2, EventType::Deleted),
            ev(3, EventType::Modified),
        ]);
        assert_eq!(merged, Some(ev(3, EventType::Modified)));
    }

    #[test]
    fn groups_by_storage_and_path() {
        let events = vec![
            EventRecord::new(1, EventType::Created, "fs", "a.txt"),
            EventRecord::new(2, EventType::Deleted, "fs", "a.txt"),
            EventRecord::new(1, EventType::Created, "other", "a.txt"),
            EventRecord::new(1, EventType::Modified, "fs", "b.txt"),
        ];
        let merged = merge_events(events);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].storage_id, "fs");
        assert_eq!(merged[0].path, "b.txt");
        assert_eq!(merged[1].storage_id, "other");
    }

    fn event_type() -> impl Strategy<Value = EventType> {
        prop::sample::select(EventType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn net_event_is_one_of_the_inputs(types in prop::collection::vec(event_type(), 1..12)) {
            let events: Vec<_> = types
                .iter()
                .enumerate()
                .map(|(i, kind)| ev(i64::try_from(i).unwrap(), *kind))
                .collect();
            if let Some(net) = merge_group(events.clone()) {
                prop_assert!(events.contains(&net));
            }
        }

        #[test]
        fn without_create_latest_event_wins(
            types in prop::collection::vec(
                event_type().prop_filter("no create", |t| *t != EventType::Created),
                1..12,
            )
        ) {
            let events: Vec<_> = types
                .iter()
                .enumerate()
                .map(|(i, kind)| ev(i64::try_from(i).unwrap(), *kind))
                .collect();
            let last = events.last().cloned();
            prop_assert_eq!(merge_group(events), last);
        }

        #[test]
        fn merge_is_independent_of_input_order(
            types in prop::collection::vec(event_type(), 1..10),
            seed in any::<u64>(),
        ) {
            let events: Vec<_> = types
                .iter()
                .enumerate()
                .map(|(i, kind)| ev(i64::try_from(i).unwrap(), *kind))
                .collect();
            let mut shuffled = events.clone();
            let len = shuffled.len();
            shuffled.rotate_left(usize::try_from(seed % len as u64).unwrap());
            prop_assert_eq!(merge_group(events), merge_group(shuffled));
        }
    }
}
