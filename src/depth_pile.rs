//! # Depth pile
//!
//! A bounded ring of the most recent GNSS fixes (and any co-sampled sensor
//! readings), each with a remaining burst count. Implemented as an
//! index-addressed fixed array with head/size, per the design note in §9
//! ("the depth pile is a bounded ring; implement as an index-addressed
//! array with head/size, no pointers escape").

use crate::types::DepthPileEntry;

/// Ring capacity, the largest configurable `depth_pile` value (§3).
pub const CAPACITY: usize = 24;

/// Max fixes a single Argos frame can carry (one header + up to three more
/// `{lat, lon}` pairs, §4.3). A configured `depth_pile` larger than this
/// widens the *pool* `retrieve` scans for eligible entries; it does not
/// grow the number of fixes committed to a single frame (see DESIGN.md).
pub const MAX_ENTRIES_PER_FRAME: usize = 4;

pub struct DepthPile {
    entries: [Option<DepthPileEntry>; CAPACITY],
    /// Index the next `store` will write to.
    head: usize,
    /// Number of occupied slots, saturating at `CAPACITY`.
    len: usize,
    /// Position in the current recency-order lap the next `retrieve` picks
    /// up from; wraps to 0 once a lap completes.
    cursor: usize,
}

impl Default for DepthPile {
    fn default() -> Self {
        DepthPile { entries: [None; CAPACITY], head: 0, len: 0, cursor: 0 }
    }
}

impl DepthPile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new entry. Overwrites the oldest entry when at capacity.
    pub fn store(&mut self, entry: DepthPileEntry) {
        self.entries[self.head] = Some(entry);
        self.head = (self.head + 1) % CAPACITY;
        if self.len < CAPACITY {
            self.len += 1;
        }
    }

    /// Occupied slot indices, most-recent first.
    fn recency_order(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).map(move |i| (self.head + CAPACITY - 1 - i) % CAPACITY)
    }

    /// Returns up to `n` (capped at [`MAX_ENTRIES_PER_FRAME`]) eligible
    /// entries (`burst_counter > 0`), decrementing each returned entry's
    /// counter by one. Scans the recency-ordered pool starting where the
    /// previous call left off rather than restarting from most-recent each
    /// time, so repeated calls round-robin across the pool instead of
    /// re-serving the same head entries; a call stops at the lap boundary
    /// without wrapping into a second pass, so it can return fewer than `n`
    /// even when the pool holds further eligible entries in the next lap.
    pub fn retrieve(&mut self, n: usize) -> ([Option<DepthPileEntry>; MAX_ENTRIES_PER_FRAME], usize) {
        let want = n.min(MAX_ENTRIES_PER_FRAME);
        let mut out = [None; MAX_ENTRIES_PER_FRAME];
        let mut filled = 0;
        if self.len == 0 {
            return (out, 0);
        }
        if self.cursor >= self.len {
            self.cursor = 0;
        }
        while self.cursor < self.len && filled < want {
            let pos = self.cursor;
            let idx = (self.head + CAPACITY - 1 - pos) % CAPACITY;
            self.cursor += 1;
            if let Some(e) = &mut self.entries[idx] {
                if e.burst_counter > 0 {
                    e.burst_counter -= 1;
                    out[filled] = Some(*e);
                    filled += 1;
                }
            }
        }
        if self.cursor >= self.len {
            self.cursor = 0;
        }
        (out, filled)
    }

    /// Returns the single most-recent entry without decrementing its
    /// burst counter (time-sync burst path).
    pub fn retrieve_latest(&self) -> Option<DepthPileEntry> {
        self.recency_order().find_map(|idx| self.entries[idx])
    }

    /// Count of entries with `burst_counter > 0`.
    pub fn eligible(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e, Some(e) if e.burst_counter > 0)).count()
    }

    #[cfg(test)]
    fn sum_counters(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.map(|e| e.burst_counter as u64)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FixType, GpsFix, SensorAttachments};

    fn fix(schedule_epoch_s: u32) -> GpsFix {
        GpsFix {
            year: 2024,
            month: 1,
            day: 1,
            hour: 0,
            min: 0,
            sec: 0,
            latitude: 0.0,
            longitude: 0.0,
            valid: true,
            fix_type: FixType::Fix3D,
            ground_speed_mm_s: 0,
            heading_units: 0,
            altitude_mm: 0,
            battery_mv: 4000,
            schedule_epoch_s,
        }
    }

    fn entry(schedule_epoch_s: u32, burst: u32) -> DepthPileEntry {
        DepthPileEntry { fix: fix(schedule_epoch_s), sensors: SensorAttachments::default(), burst_counter: burst }
    }

    #[test]
    fn retrieve_decrements_and_is_most_recent_first() {
        let mut pile = DepthPile::new();
        pile.store(entry(1, 2));
        pile.store(entry(2, 2));
        pile.store(entry(3, 2));
        let (got, n) = pile.retrieve(2);
        assert_eq!(n, 2);
        assert_eq!(got[0].unwrap().fix.schedule_epoch_s, 3);
        assert_eq!(got[1].unwrap().fix.schedule_epoch_s, 2);
        assert_eq!(pile.eligible(), 3);
    }

    #[test]
    fn retrieve_latest_does_not_decrement() {
        let mut pile = DepthPile::new();
        pile.store(entry(1, 1));
        let before = pile.eligible();
        let latest = pile.retrieve_latest().unwrap();
        assert_eq!(latest.burst_counter, 1);
        assert_eq!(pile.eligible(), before);
    }

    #[test]
    fn overwrites_oldest_at_capacity() {
        let mut pile = DepthPile::new();
        for i in 0..(CAPACITY as u32 + 1) {
            pile.store(entry(i, 1));
        }
        let seen_zero = pile.entries.iter().flatten().any(|e| e.fix.schedule_epoch_s == 0);
        assert!(!seen_zero);
    }

    #[test]
    fn eligible_equals_sum_of_unit_counters() {
        let mut pile = DepthPile::new();
        pile.store(entry(1, 1));
        pile.store(entry(2, 1));
        pile.store(entry(3, 0));
        assert_eq!(pile.eligible() as u64, pile.sum_counters());
    }

    #[test]
    fn retrieve_returns_fewer_than_requested_when_pool_is_dry() {
        let mut pile = DepthPile::new();
        pile.store(entry(1, 1));
        let (got, n) = pile.retrieve(4);
        assert_eq!(n, 1);
        assert!(got[1].is_none());
    }

    #[test]
    fn successive_retrieves_round_robin_instead_of_reserving_the_head() {
        let mut pile = DepthPile::new();
        for i in 0..6 {
            pile.store(entry(i, 99_999_999));
        }
        let (_, n1) = pile.retrieve(16);
        assert_eq!(n1, 4);
        let (_, n2) = pile.retrieve(16);
        assert_eq!(n2, 2);
    }
}
