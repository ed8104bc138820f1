use std::collections::{HashMap, HashSet};

use crate::thread_owner::ThreadOwner;

/// Who entered and left a viewer's view since the last update.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub entered: Vec<u64>,
    pub left: Vec<u64>,
}

/// Tracks which players each player has been told about.
///
/// The relation is stored in both directions, `known_to[viewer]` and
/// `known_by[subject]`, and every insertion and deletion touches both as
/// one transaction. The reverse map is what makes disconnect cleanup O(K)
/// in the number of mutual acquaintances instead of O(N) over all players.
#[derive(Debug, Default)]
pub struct VisibilityTracker {
    known_to: HashMap<u64, HashSet<u64>>,
    known_by: HashMap<u64, HashSet<u64>>,
    owner: ThreadOwner,

    // Scratch buffers reused across calls; clear() keeps capacity, so after
    // a few ticks these stop allocating.
    scratch_visible: HashSet<u64>,
    scratch_remove: Vec<u64>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares the currently visible set against what the viewer already
    /// knows, updates the relation, and returns who entered and left.
    pub fn update(&mut self, viewer_id: u64, visible_now: &[u64]) -> Diff {
        self.owner.check();
        let mut diff = Diff::default();

        self.scratch_visible.clear();
        for &id in visible_now {
            if id != viewer_id {
                self.scratch_visible.insert(id);
            }
        }

        let known = self.known_to.entry(viewer_id).or_default();
        for &id in &self.scratch_visible {
            if known.insert(id) {
                diff.entered.push(id);
                self.known_by.entry(id).or_default().insert(viewer_id);
            }
        }

        self.scratch_remove.clear();
        for &known_id in known.iter() {
            if !self.scratch_visible.contains(&known_id) {
                self.scratch_remove.push(known_id);
            }
        }
        for &id in &self.scratch_remove {
            known.remove(&id);
            diff.left.push(id);
            if let Some(holders) = self.known_by.get_mut(&id) {
                holders.remove(&viewer_id);
                if holders.is_empty() {
                    self.known_by.remove(&id);
                }
            }
        }

        diff
    }

    /// Seeds a viewer's known set after the initial batch-spatial packet.
    /// Any previous relation for the viewer is dismantled first.
    pub fn initialize(&mut self, viewer_id: u64, initial_visible: &[u64]) {
        self.owner.check();
        if let Some(old) = self.known_to.remove(&viewer_id) {
            for id in old {
                if let Some(holders) = self.known_by.get_mut(&id) {
                    holders.remove(&viewer_id);
                    if holders.is_empty() {
                        self.known_by.remove(&id);
                    }
                }
            }
        }

        let known = self.known_to.entry(viewer_id).or_default();
        for &id in initial_visible {
            if id != viewer_id && known.insert(id) {
                self.known_by.entry(id).or_default().insert(viewer_id);
            }
        }
    }

    /// Adds a single relation in both directions.
    pub fn add_known(&mut self, viewer_id: u64, subject_id: u64) {
        self.owner.check();
        if viewer_id == subject_id {
            return;
        }
        self.known_to.entry(viewer_id).or_default().insert(subject_id);
        self.known_by.entry(subject_id).or_default().insert(viewer_id);
    }

    /// After a move, finds every observer that lost sight of the mover,
    /// removes those relations, and returns the observers so the caller can
    /// tell each one the mover left its view.
    ///
    /// This is the half of the bookkeeping `update` cannot see: the mover's
    /// own diff covers who *it* can no longer see, not who can no longer see
    /// *it*.
    pub fn notify_observers_of_departure(
        &mut self,
        mover_id: u64,
        mover_x: i16,
        mover_y: i16,
        view_range: i16,
        get_pos: impl Fn(u64) -> Option<(i16, i16)>,
    ) -> Vec<u64> {
        self.owner.check();
        let mut lost = Vec::new();

        let Some(holders) = self.known_by.get_mut(&mover_id) else {
            return lost;
        };

        self.scratch_remove.clear();
        for &observer_id in holders.iter() {
            let out_of_range = match get_pos(observer_id) {
                Some((ox, oy)) => {
                    let dx = (i32::from(mover_x) - i32::from(ox)).abs();
                    let dy = (i32::from(mover_y) - i32::from(oy)).abs();
                    dx > i32::from(view_range) || dy > i32::from(view_range)
                }
                // An observer with no position is gone; drop the relation.
                None => true,
            };
            if out_of_range {
                lost.push(observer_id);
                self.scratch_remove.push(observer_id);
            }
        }

        for &observer_id in &self.scratch_remove {
            holders.remove(&observer_id);
            if let Some(known) = self.known_to.get_mut(&observer_id) {
                known.remove(&mover_id);
            }
        }
        if holders.is_empty() {
            self.known_by.remove(&mover_id);
        }

        lost
    }

    /// Erases every relation involving a player. O(K) in the player's mutual
    /// acquaintance count.
    pub fn remove(&mut self, player_id: u64) {
        self.owner.check();
        if let Some(holders) = self.known_by.remove(&player_id) {
            for observer_id in holders {
                if let Some(known) = self.known_to.get_mut(&observer_id) {
                    known.remove(&player_id);
                }
            }
        }
        if let Some(known) = self.known_to.remove(&player_id) {
            for subject_id in known {
                if let Some(holders) = self.known_by.get_mut(&subject_id) {
                    holders.remove(&player_id);
                    if holders.is_empty() {
                        self.known_by.remove(&subject_id);
                    }
                }
            }
        }
    }

    pub fn known_to(&self, viewer_id: u64) -> Option<&HashSet<u64>> {
        self.owner.check();
        self.known_to.get(&viewer_id)
    }

    pub fn known_by(&self, subject_id: u64) -> Option<&HashSet<u64>> {
        self.owner.check();
        self.known_by.get(&subject_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.owner.check();
        self.known_to.len()
    }

    pub fn clear(&mut self) {
        self.owner.check();
        self.known_to.clear();
        self.known_by.clear();
    }
}
