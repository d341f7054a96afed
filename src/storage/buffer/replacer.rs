//! Victim selection policies for the buffer pool.
//!
//! A replacer tracks the candidate set of evictable frames (those whose pin
//! count has dropped to zero) and picks victims when the pool runs out of
//! free frames. Two policies ship: CLOCK (second chance) and LRU-K with a
//! two-deep access history.

use super::frame::FrameId;

/// Victim policy contract.
///
/// - `pin` removes a frame from the candidate set.
/// - `unpin` adds it, recording an access.
/// - `victim` selects a candidate and atomically removes it from the set;
///   `None` iff the candidate set is empty.
///
/// Frames pinned for the first time (on fetch or new-page) begin outside the
/// candidate set. Implementations are not internally synchronized; the pool
/// calls them under its own mutex.
pub trait Replacer: Send {
    /// Removes `fid` from the candidate set. No-op when absent.
    fn pin(&mut self, fid: FrameId);

    /// Adds `fid` to the candidate set and records an access.
    fn unpin(&mut self, fid: FrameId);

    /// Selects a victim and removes it from the candidate set.
    fn victim(&mut self) -> Option<FrameId>;

    /// Number of frames in the candidate set.
    fn size(&self) -> usize;
}

/// String-form policy selection: `"clock"`, `"lruk"`, or `"lruk:k=N"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerConfig {
    /// Second-chance CLOCK.
    Clock,
    /// LRU-K ranking by the K-th most recent access.
    LruK {
        /// K value, at least 2.
        k: usize,
    },
}

impl ReplacerConfig {
    /// Parses a configuration string. Returns `None` for unknown forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clock" => Some(Self::Clock),
            "lruk" => Some(Self::LruK { k: 2 }),
            _ => {
                let rest = s.strip_prefix("lruk:k=")?;
                let k: usize = rest.parse().ok()?;
                Some(Self::LruK { k: k.max(2) })
            }
        }
    }

    /// Builds a policy instance for a pool with `capacity` frames.
    pub fn build(self, capacity: usize) -> Box<dyn Replacer> {
        match self {
            Self::Clock => Box::new(ClockReplacer::new(capacity)),
            Self::LruK { k } => Box::new(LruKReplacer::new(capacity, k)),
        }
    }
}

/// CLOCK (second chance) policy.
///
/// Keeps one candidate bit and one reference bit per frame and a circular
/// hand. `unpin` sets both bits; `pin` clears both. `victim` advances the
/// hand, clearing reference bits it passes, and selects the first candidate
/// whose reference bit is already clear. The scan is bounded to twice the
/// capacity so an empty candidate set terminates.
pub struct ClockReplacer {
    present: Vec<bool>,
    referenced: Vec<bool>,
    hand: usize,
    capacity: usize,
}

impl ClockReplacer {
    /// Creates a CLOCK policy for `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            present: vec![false; capacity],
            referenced: vec![false; capacity],
            hand: 0,
            capacity,
        }
    }
}

impl Replacer for ClockReplacer {
    fn pin(&mut self, fid: FrameId) {
        if fid >= self.capacity {
            return;
        }
        self.present[fid] = false;
        self.referenced[fid] = false;
    }

    fn unpin(&mut self, fid: FrameId) {
        if fid >= self.capacity {
            return;
        }
        self.present[fid] = true;
        self.referenced[fid] = true;
    }

    fn victim(&mut self) -> Option<FrameId> {
        if self.capacity == 0 {
            return None;
        }

        let limit = self.capacity * 2;
        for _ in 0..limit {
            let fid = self.hand;
            if self.present[fid] {
                if self.referenced[fid] {
                    self.referenced[fid] = false;
                } else {
                    self.present[fid] = false;
                    self.hand = (self.hand + 1) % self.capacity;
                    return Some(fid);
                }
            }
            self.hand = (self.hand + 1) % self.capacity;
        }
        None
    }

    fn size(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }
}

/// Per-frame LRU-K state. Timestamps are logical ticks; 0 means "never".
#[derive(Debug, Clone, Copy, Default)]
struct LruKEntry {
    present: bool,
    /// Most recent access tick.
    last1: u64,
    /// Previous access tick; 0 while the frame has been seen fewer than
    /// twice.
    last2: u64,
}

/// LRU-K policy with a two-deep access history.
///
/// Accesses are recorded on `unpin`; `pin` only removes the frame from the
/// candidate set, keeping its history. Victim selection strictly prefers
/// frames observed fewer than K times (by oldest `last1`); fully observed
/// frames rank by oldest `last2`. Ties break to the lowest frame id.
///
/// The ranking distinguishes "second-recent" hotness: a page touched once
/// is a weaker cache citizen than a page touched twice, no matter how long
/// ago the twice-touched page's history began.
pub struct LruKReplacer {
    entries: Vec<LruKEntry>,
    capacity: usize,
    k: usize,
    clock: u64,
}

impl LruKReplacer {
    /// Creates an LRU-K policy for `capacity` frames. `k` is clamped to at
    /// least 2; the retained history is two accesses deep.
    pub fn new(capacity: usize, k: usize) -> Self {
        Self {
            entries: vec![LruKEntry::default(); capacity],
            capacity,
            k: k.max(2),
            clock: 0,
        }
    }

    /// Configured K value.
    pub fn k(&self) -> usize {
        self.k
    }

    fn touch(&mut self, fid: FrameId) {
        self.clock += 1;
        let entry = &mut self.entries[fid];
        entry.last2 = entry.last1;
        entry.last1 = self.clock;
    }
}

impl Replacer for LruKReplacer {
    fn pin(&mut self, fid: FrameId) {
        if fid >= self.capacity {
            return;
        }
        self.entries[fid].present = false;
    }

    fn unpin(&mut self, fid: FrameId) {
        if fid >= self.capacity {
            return;
        }
        self.entries[fid].present = true;
        self.touch(fid);
    }

    fn victim(&mut self) -> Option<FrameId> {
        let mut selected: Option<(FrameId, bool, u64)> = None;

        for (fid, entry) in self.entries.iter().enumerate() {
            if !entry.present {
                continue;
            }
            let cold = entry.last2 == 0;
            let key = if cold { entry.last1 } else { entry.last2 };
            let better = match selected {
                None => true,
                // Cold frames (seen fewer than K times) always beat warm
                // ones; within a tier, older key wins. Ascending iteration
                // keeps the lowest frame id on ties.
                Some((_, sel_cold, sel_key)) => match (cold, sel_cold) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => key < sel_key,
                },
            };
            if better {
                selected = Some((fid, cold, key));
            }
        }

        let (fid, _, _) = selected?;
        self.entries[fid].present = false;
        Some(fid)
    }

    fn size(&self) -> usize {
        self.entries.iter().filter(|e| e.present).count()
    }
}
