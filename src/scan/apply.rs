//! Pass 2: turn cached contributions into scan values and run the scan
//! phases, starting from the thread's offset.

use super::accumulate::ChunkCache;
use super::lanes::inclusive_scan;
use super::ScanBody;
use crate::config::ScanDirection;
use crate::lastprivate::Phase;
use crate::operator::Combiner;
use crate::partition::IterationPartitioner;
use crate::privatization::ThreadBindings;

pub struct SecondPassApplier<'a, T> {
    combiner: &'a Combiner<T>,
    partitioner: &'a IterationPartitioner,
    direction: ScanDirection,
}

impl<'a, T: Copy> SecondPassApplier<'a, T> {
    pub fn new(
        combiner: &'a Combiner<T>,
        partitioner: &'a IterationPartitioner,
        direction: ScanDirection,
    ) -> Self {
        Self {
            combiner,
            partitioner,
            direction,
        }
    }

    /// Writes `output[i - chunk.start]` for every iteration of the cached
    /// chunk and returns the running value after the last one.
    ///
    /// Private copies are rewound to their pass-1 entry state and the
    /// input-phase writes are replayed in sequential order, so every scan
    /// phase observes the bindings a sequential run would show it.
    pub fn apply<B>(
        &self,
        cache: &ChunkCache<T, B::Value>,
        offset: T,
        output: &mut [T],
        body: &B,
        bindings: &mut ThreadBindings<'_, B::Value>,
    ) -> T
    where
        B: ScanBody<T> + ?Sized,
    {
        debug_assert_eq!(output.len(), cache.chunk.len());
        let chunk = cache.chunk;
        let mut carry = offset;
        let mut lanes = Vec::with_capacity(self.partitioner.lane_width());

        bindings.restore(&cache.entry_values);
        for group in self.partitioner.lanes(&chunk) {
            let base = group.start - chunk.start;
            let records = &cache.records[base..base + group.len()];
            lanes.clear();
            lanes.extend(records.iter().map(|record| record.value));
            inclusive_scan(&mut lanes, self.combiner);

            for (k, i) in group.range().enumerate() {
                let local = base + k;
                let scan_value = match self.direction {
                    ScanDirection::Inclusive => {
                        bindings.replay(&cache.records[local].writes);
                        self.combiner.combine(carry, lanes[k])
                    }
                    ScanDirection::Exclusive => {
                        if local > 0 {
                            bindings.replay(&cache.records[local - 1].writes);
                        }
                        if k == 0 {
                            carry
                        } else {
                            self.combiner.combine(carry, lanes[k - 1])
                        }
                    }
                };
                bindings.enter(i, Phase::Scan);
                output[local] = scan_value;
                body.scan(i, scan_value, bindings);
            }

            if let Some(&group_total) = lanes.last() {
                carry = self.combiner.combine(carry, group_total);
            }
        }

        // An exclusive body ends with the input phase of its last iteration.
        if self.direction == ScanDirection::Exclusive {
            if let Some(last) = cache.records.last() {
                bindings.replay(&last.writes);
            }
        }
        carry
    }
}
