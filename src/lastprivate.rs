//! Lastprivate candidate tracking and cross-thread winner resolution.
//!
//! Every write to a lastprivate binding is stamped with its sequential
//! position: the iteration, then which body phase ran first in that
//! iteration. Within one thread the latest stamp wins. Across threads,
//! conditional lastprivate takes the maximum stamp over the whole iteration
//! space; unconditional lastprivate takes the thread that owns the
//! sequentially last iteration.

use crate::config::ScanDirection;
use log::debug;

/// Part of the loop body relative to the scan directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Contributes to the reduction.
    Input,
    /// Observes the scan value.
    Scan,
}

impl Phase {
    /// Position of the phase inside one iteration. An inclusive scan
    /// directive follows the input phase; an exclusive one precedes it.
    pub fn order(self, direction: ScanDirection) -> u8 {
        match (direction, self) {
            (ScanDirection::Inclusive, Phase::Input) | (ScanDirection::Exclusive, Phase::Scan) => 0,
            (ScanDirection::Inclusive, Phase::Scan) | (ScanDirection::Exclusive, Phase::Input) => 1,
        }
    }
}

/// Sequential position of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub iteration: usize,
    order: u8,
    pub phase: Phase,
}

impl Stamp {
    pub fn new(iteration: usize, phase: Phase, direction: ScanDirection) -> Self {
        Self {
            iteration,
            order: phase.order(direction),
            phase,
        }
    }
}

// `order` decides; `phase` only breaks ties that cannot occur.
impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastprivateKind {
    Unconditional,
    /// `lastprivate(conditional: ...)`; only assignments that executed count.
    Conditional,
}

/// Best candidate seen by one thread for one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct LastprivateSlot<V> {
    pub value: Option<V>,
    pub source: Option<Stamp>,
}

impl<V> Default for LastprivateSlot<V> {
    fn default() -> Self {
        Self {
            value: None,
            source: None,
        }
    }
}

impl<V: Clone> LastprivateSlot<V> {
    pub fn has_value(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_iteration(&self) -> Option<usize> {
        self.source.map(|stamp| stamp.iteration)
    }

    /// Records a write; equal stamps keep the later write.
    pub fn record(&mut self, stamp: Stamp, value: V) {
        if self.source.map_or(true, |best| stamp >= best) {
            self.value = Some(value);
            self.source = Some(stamp);
        }
    }
}

/// One thread's candidate for one tracked variable, handed back on join.
#[derive(Debug, Clone)]
pub struct ThreadCandidate<V> {
    pub thread_id: usize,
    pub slot: LastprivateSlot<V>,
    /// The thread's private copy at the end of the construct.
    pub final_value: V,
}

/// Resolves one variable's winner from the per-thread candidates.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalLastprivateTracker {
    kind: LastprivateKind,
}

impl ConditionalLastprivateTracker {
    pub fn new(kind: LastprivateKind) -> Self {
        Self { kind }
    }

    /// Returns the value to copy back, or `None` to leave the original alone.
    ///
    /// `last_owner` is the thread executing the sequentially last iteration
    /// (`None` for an empty loop).
    pub fn resolve<V: Clone>(
        &self,
        candidates: &[ThreadCandidate<V>],
        last_owner: Option<usize>,
    ) -> Option<V> {
        match self.kind {
            LastprivateKind::Conditional => {
                let (stamp, winner) = candidates
                    .iter()
                    .filter_map(|c| c.slot.source.map(|stamp| (stamp, c)))
                    .max_by_key(|(stamp, _)| *stamp)?;
                debug!(
                    "conditional lastprivate won by thread {} at iteration {} ({:?} phase)",
                    winner.thread_id, stamp.iteration, stamp.phase
                );
                winner.slot.value.clone()
            }
            LastprivateKind::Unconditional => {
                let owner = last_owner?;
                let candidate = candidates.iter().find(|c| c.thread_id == owner)?;
                debug!("unconditional lastprivate taken from thread {}", owner);
                Some(
                    candidate
                        .slot
                        .value
                        .clone()
                        .unwrap_or_else(|| candidate.final_value.clone()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INC: ScanDirection = ScanDirection::Inclusive;
    const EXC: ScanDirection = ScanDirection::Exclusive;

    fn candidate(
        thread_id: usize,
        writes: &[(usize, Phase, i32)],
        final_value: i32,
    ) -> ThreadCandidate<i32> {
        let mut slot = LastprivateSlot::default();
        for &(iteration, phase, value) in writes {
            slot.record(Stamp::new(iteration, phase, INC), value);
        }
        ThreadCandidate { thread_id, slot, final_value }
    }

    #[test]
    fn test_slot_keeps_latest_stamp() {
        let mut slot = LastprivateSlot::default();
        assert!(!slot.has_value());
        slot.record(Stamp::new(4, Phase::Scan, INC), 40);
        slot.record(Stamp::new(5, Phase::Input, INC), 50);
        // Pass 2 revisits iteration 4 after pass 1 already saw iteration 5.
        slot.record(Stamp::new(4, Phase::Scan, INC), 41);
        assert_eq!(slot.value, Some(50));
        assert_eq!(slot.source_iteration(), Some(5));
        slot.record(Stamp::new(5, Phase::Input, INC), 51);
        assert_eq!(slot.value, Some(51));
    }

    #[test]
    fn test_phase_order_follows_directive() {
        assert!(Stamp::new(7, Phase::Scan, INC) > Stamp::new(7, Phase::Input, INC));
        assert!(Stamp::new(7, Phase::Input, EXC) > Stamp::new(7, Phase::Scan, EXC));
        assert!(Stamp::new(8, Phase::Scan, EXC) > Stamp::new(7, Phase::Input, EXC));
        assert!(Stamp::new(8, Phase::Input, INC) > Stamp::new(7, Phase::Scan, INC));
    }

    #[test]
    fn test_conditional_takes_global_maximum() {
        let tracker = ConditionalLastprivateTracker::new(LastprivateKind::Conditional);
        let candidates = vec![
            candidate(0, &[(10, Phase::Input, 1), (200, Phase::Scan, 2)], 0),
            candidate(1, &[(300, Phase::Input, 3)], 0),
            candidate(2, &[], 0),
        ];
        assert_eq!(tracker.resolve(&candidates, Some(2)), Some(3));
    }

    #[test]
    fn test_conditional_without_true_guard_is_unset() {
        let tracker = ConditionalLastprivateTracker::new(LastprivateKind::Conditional);
        let candidates = vec![candidate(0, &[], 5), candidate(1, &[], 6)];
        assert_eq!(tracker.resolve(&candidates, Some(1)), None);
    }

    #[test]
    fn test_unconditional_uses_last_owner() {
        let tracker = ConditionalLastprivateTracker::new(LastprivateKind::Unconditional);
        let candidates = vec![
            candidate(0, &[(3, Phase::Input, 30)], 30),
            candidate(1, &[(7, Phase::Input, 70)], 70),
            candidate(2, &[], 0),
        ];
        assert_eq!(tracker.resolve(&candidates, Some(1)), Some(70));
        assert_eq!(tracker.resolve(&candidates, None), None);
    }

    #[test]
    fn test_unconditional_falls_back_to_private_copy() {
        let tracker = ConditionalLastprivateTracker::new(LastprivateKind::Unconditional);
        let candidates = vec![candidate(0, &[], -12)];
        assert_eq!(tracker.resolve(&candidates, Some(0)), Some(-12));
    }
}
