//! Enter/Stay/Exit bookkeeping over per-step overlap snapshots.
//!
//! After every completed step the orchestrator hands the dispatcher the set
//! of overlapping entity pairs. The dispatcher diffs it against the active
//! set of the previous step with three set operations:
//!
//! - `enter = current - previous`
//! - `stay  = current & previous`
//! - `exit  = previous - current`
//!
//! and then replaces the active set with `current`. Only pairs whose two
//! endpoints are alive enter the active set.

use std::collections::{HashMap, HashSet};

use cairn_ecs::entity::EntityId;
use tracing::trace;

use crate::config::DestroyedExitPolicy;
use crate::physics::world::ContactKind;

// ---------------------------------------------------------------------------
// CollisionPair
// ---------------------------------------------------------------------------

/// Unordered pair of entities. `CollisionPair::new(a, b) ==
/// CollisionPair::new(b, a)` and both hash the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionPair {
    lo: EntityId,
    hi: EntityId,
}

impl CollisionPair {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    /// Both endpoints, smaller handle first.
    pub fn entities(&self) -> (EntityId, EntityId) {
        (self.lo, self.hi)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.lo == entity || self.hi == entity
    }

    /// The endpoint that is not `entity`, or `None` if `entity` is not part
    /// of the pair.
    pub fn other(&self, entity: EntityId) -> Option<EntityId> {
        if self.lo == entity {
            Some(self.hi)
        } else if self.hi == entity {
            Some(self.lo)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One pair in one lifecycle set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    pub pair: CollisionPair,
    pub kind: ContactKind,
}

/// Lifecycle sets produced by one completed step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionReport {
    /// Index of the step the overlaps were taken from.
    pub step: u64,
    pub enter: Vec<CollisionEvent>,
    pub stay: Vec<CollisionEvent>,
    /// Exits to deliver. With [`DestroyedExitPolicy::NotifySurvivor`] a pair
    /// may have a destroyed endpoint; receivers skip endpoints that are no
    /// longer alive.
    pub exit: Vec<CollisionEvent>,
}

impl CollisionReport {
    pub fn is_empty(&self) -> bool {
        self.enter.is_empty() && self.stay.is_empty() && self.exit.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CollisionDispatcher
// ---------------------------------------------------------------------------

/// Owns the active collision set.
#[derive(Debug, Default)]
pub struct CollisionDispatcher {
    active: HashMap<CollisionPair, ContactKind>,
    policy: DestroyedExitPolicy,
}

impl CollisionDispatcher {
    pub fn new(policy: DestroyedExitPolicy) -> Self {
        Self {
            active: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DestroyedExitPolicy {
        self.policy
    }

    /// Diff `overlaps` against the active set and advance it.
    ///
    /// `is_alive` decides endpoint validity: overlaps with a dead endpoint
    /// never become active, and exits with a dead endpoint follow the
    /// configured [`DestroyedExitPolicy`]. A pair reported more than once is
    /// a trigger if any report says so.
    pub fn dispatch(
        &mut self,
        step: u64,
        overlaps: impl IntoIterator<Item = (EntityId, EntityId, ContactKind)>,
        is_alive: impl Fn(EntityId) -> bool,
    ) -> CollisionReport {
        let mut current: HashMap<CollisionPair, ContactKind> = HashMap::new();
        for (a, b, kind) in overlaps {
            if a == b || !is_alive(a) || !is_alive(b) {
                continue;
            }
            let slot = current.entry(CollisionPair::new(a, b)).or_insert(kind);
            if kind == ContactKind::Trigger {
                *slot = ContactKind::Trigger;
            }
        }

        let previous_keys: HashSet<CollisionPair> = self.active.keys().copied().collect();
        let current_keys: HashSet<CollisionPair> = current.keys().copied().collect();

        let event = |pair: &CollisionPair, kinds: &HashMap<CollisionPair, ContactKind>| CollisionEvent {
            pair: *pair,
            kind: kinds[pair],
        };

        let mut report = CollisionReport {
            step,
            enter: current_keys
                .difference(&previous_keys)
                .map(|p| event(p, &current))
                .collect(),
            stay: current_keys
                .intersection(&previous_keys)
                .map(|p| event(p, &current))
                .collect(),
            exit: Vec::new(),
        };

        for pair in previous_keys.difference(&current_keys) {
            let (a, b) = pair.entities();
            let (a_alive, b_alive) = (is_alive(a), is_alive(b));
            let deliver = match (a_alive && b_alive, self.policy) {
                (true, _) => true,
                (false, DestroyedExitPolicy::DropPair) => false,
                (false, DestroyedExitPolicy::NotifySurvivor) => a_alive || b_alive,
            };
            if deliver {
                report.exit.push(event(pair, &self.active));
            } else {
                trace!(?pair, "dropping exit for destroyed endpoint");
            }
        }

        report.enter.sort_by_key(|e| e.pair);
        report.stay.sort_by_key(|e| e.pair);
        report.exit.sort_by_key(|e| e.pair);

        trace!(
            step,
            enter = report.enter.len(),
            stay = report.stay.len(),
            exit = report.exit.len(),
            "collision dispatch"
        );

        self.active = current;
        report
    }

    /// Whether `pair` overlapped at the end of the last completed step.
    pub fn is_active(&self, pair: &CollisionPair) -> bool {
        self.active.contains_key(pair)
    }

    /// Active pairs in sorted order.
    pub fn active_pairs(&self) -> Vec<CollisionPair> {
        let mut pairs: Vec<CollisionPair> = self.active.keys().copied().collect();
        pairs.sort();
        pairs
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Forget every active pair without producing exits.
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
