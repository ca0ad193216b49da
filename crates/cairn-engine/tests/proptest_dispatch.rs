//! Property tests for the collision dispatcher.
//!
//! Random per-step overlap schedules are fed into a [`CollisionDispatcher`]
//! and the emitted events are checked against the schedule: every run of
//! k overlapping steps yields one Enter, k - 1 Stays and one Exit, in that
//! order.

use std::collections::HashMap;

use cairn_engine::prelude::*;
use proptest::prelude::*;

const ENTITIES: u32 = 4;

fn entity(i: u32) -> EntityId {
    EntityId::new(i, 0)
}

/// All unordered pairs over `ENTITIES` entities.
fn all_pairs() -> Vec<(EntityId, EntityId)> {
    let mut pairs = Vec::new();
    for a in 0..ENTITIES {
        for b in a + 1..ENTITIES {
            pairs.push((entity(a), entity(b)));
        }
    }
    pairs
}

#[derive(Debug, Default, PartialEq)]
struct Counts {
    enter: usize,
    stay: usize,
    exit: usize,
}

/// Expected counts for one pair's overlap history, assuming the history is
/// followed by a step with no overlap.
fn expected(history: &[bool]) -> Counts {
    let mut counts = Counts::default();
    let mut run = 0;
    for &overlapping in history.iter().chain(std::iter::once(&false)) {
        if overlapping {
            run += 1;
        } else if run > 0 {
            counts.enter += 1;
            counts.stay += run - 1;
            counts.exit += 1;
            run = 0;
        }
    }
    counts
}

fn schedule() -> impl Strategy<Value = Vec<Vec<bool>>> {
    let pairs = all_pairs().len();
    prop::collection::vec(prop::collection::vec(any::<bool>(), pairs), 1..40)
}

proptest! {
    #[test]
    fn enter_stay_exit_counts_follow_overlap_runs(steps in schedule()) {
        let pairs = all_pairs();
        let mut dispatcher = CollisionDispatcher::new(DestroyedExitPolicy::DropPair);
        let mut seen: HashMap<CollisionPair, Counts> = HashMap::new();
        let mut last: HashMap<CollisionPair, &'static str> = HashMap::new();

        let mut record = |report: CollisionReport| {
            for (stage, events) in [("enter", &report.enter), ("stay", &report.stay), ("exit", &report.exit)] {
                for event in events {
                    let counts = seen.entry(event.pair).or_default();
                    match stage {
                        "enter" => counts.enter += 1,
                        "stay" => counts.stay += 1,
                        _ => counts.exit += 1,
                    }
                    let previous = last.insert(event.pair, stage);
                    let allowed = match stage {
                        "enter" => matches!(previous, None | Some("exit")),
                        _ => matches!(previous, Some("enter") | Some("stay")),
                    };
                    prop_assert!(allowed, "{stage} after {previous:?} for {:?}", event.pair);
                }
            }
            Ok(())
        };

        for (step, overlaps) in steps.iter().enumerate() {
            let current: Vec<(EntityId, EntityId, ContactKind)> = pairs
                .iter()
                .zip(overlaps)
                .filter(|(_, on)| **on)
                .map(|(&(a, b), _)| (a, b, ContactKind::Collision))
                .collect();
            record(dispatcher.dispatch(step as u64, current, |_| true))?;
        }
        record(dispatcher.dispatch(steps.len() as u64, Vec::new(), |_| true))?;

        for (i, &(a, b)) in pairs.iter().enumerate() {
            let history: Vec<bool> = steps.iter().map(|s| s[i]).collect();
            let got = seen.remove(&CollisionPair::new(a, b)).unwrap_or_default();
            prop_assert_eq!(got, expected(&history));
        }
        prop_assert_eq!(dispatcher.active_count(), 0);
    }

    #[test]
    fn pair_order_does_not_matter(a in 0..ENTITIES, b in 0..ENTITIES) {
        prop_assume!(a != b);
        let mut dispatcher = CollisionDispatcher::new(DestroyedExitPolicy::DropPair);
        let report = dispatcher.dispatch(
            0,
            vec![
                (entity(a), entity(b), ContactKind::Collision),
                (entity(b), entity(a), ContactKind::Collision),
            ],
            |_| true,
        );
        prop_assert_eq!(report.enter.len(), 1);
        prop_assert!(dispatcher.is_active(&CollisionPair::new(entity(b), entity(a))));
    }

    #[test]
    fn dead_endpoints_never_become_active(dead in 0..ENTITIES, steps in schedule()) {
        let pairs = all_pairs();
        let dead = entity(dead);
        let mut dispatcher = CollisionDispatcher::new(DestroyedExitPolicy::NotifySurvivor);
        for (step, overlaps) in steps.iter().enumerate() {
            let current: Vec<(EntityId, EntityId, ContactKind)> = pairs
                .iter()
                .zip(overlaps)
                .filter(|(_, on)| **on)
                .map(|(&(a, b), _)| (a, b, ContactKind::Trigger))
                .collect();
            let report = dispatcher.dispatch(step as u64, current, |e| e != dead);
            prop_assert!(report
                .enter
                .iter()
                .chain(&report.stay)
                .chain(&report.exit)
                .all(|e| !e.pair.contains(dead)));
        }
    }
}
