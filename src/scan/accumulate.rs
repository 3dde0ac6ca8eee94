//! Pass 1: run every input phase of a chunk once and fold the thread total.

use super::lanes::tree_reduce;
use super::ScanBody;
use crate::lastprivate::Phase;
use crate::operator::Combiner;
use crate::partition::{ChunkDescriptor, IterationPartitioner};
use crate::privatization::{PrivateWrite, ThreadBindings};

/// Cached outcome of one iteration's input phase.
///
/// `writes` holds the private assignments the phase executed; a guarded
/// conditional-lastprivate assignment appears only where its guard held.
#[derive(Debug, Clone)]
pub struct IterationRecord<T, V> {
    pub value: T,
    pub(crate) writes: Vec<PrivateWrite<V>>,
}

impl<T, V> IterationRecord<T, V> {
    /// Whether the input phase assigned any private variable.
    pub fn wrote_privates(&self) -> bool {
        !self.writes.is_empty()
    }
}

/// Everything pass 2 needs from pass 1 for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkCache<T, V> {
    pub chunk: ChunkDescriptor,
    pub records: Vec<IterationRecord<T, V>>,
    pub local_total: T,
    /// Private copies as they were before the first input phase.
    pub(crate) entry_values: Vec<V>,
}

pub struct LocalAccumulator<'a, T> {
    combiner: &'a Combiner<T>,
    partitioner: &'a IterationPartitioner,
}

impl<'a, T: Copy> LocalAccumulator<'a, T> {
    pub fn new(combiner: &'a Combiner<T>, partitioner: &'a IterationPartitioner) -> Self {
        Self {
            combiner,
            partitioner,
        }
    }

    /// Executes the input phase of every iteration in `chunk`, in order.
    ///
    /// Each lane group is evaluated into a lane buffer and reduced with a
    /// pairwise tree; group partials fold left to right into the total.
    pub fn accumulate<B>(
        &self,
        chunk: ChunkDescriptor,
        body: &B,
        bindings: &mut ThreadBindings<'_, B::Value>,
    ) -> ChunkCache<T, B::Value>
    where
        B: ScanBody<T> + ?Sized,
    {
        let entry_values = bindings.snapshot();
        let mut records = Vec::with_capacity(chunk.len());
        let mut lanes = Vec::with_capacity(self.partitioner.lane_width());
        let mut local_total = self.combiner.identity();

        bindings.begin_recording();
        for group in self.partitioner.lanes(&chunk) {
            lanes.clear();
            for i in group.range() {
                bindings.enter(i, Phase::Input);
                let value = body.input(i, bindings);
                lanes.push(value);
                records.push(IterationRecord {
                    value,
                    writes: bindings.take_writes(),
                });
            }
            let partial = tree_reduce(&mut lanes, self.combiner);
            local_total = self.combiner.combine(local_total, partial);
        }
        bindings.end_recording();

        ChunkCache {
            chunk,
            records,
            local_total,
            entry_values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanDirection;
    use crate::operator::ReductionOperator;
    use crate::privatization::{DataClauses, DataEnvironment, PrivateVariableBroker};
    use crate::scan::PhasedBody;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_local_total_and_single_execution() {
        let calls = AtomicUsize::new(0);
        let body = PhasedBody::<_, _, i32>::new(
            |i, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                i as i64
            },
            |_, _, _| {},
        );
        let sum = ReductionOperator::<i64>::Sum.resolve();
        let partitioner = IterationPartitioner::new(2, 3).unwrap();
        let env = DataEnvironment::<i32>::new();
        let broker = PrivateVariableBroker::new(&env, &DataClauses::new()).unwrap();
        let mut bindings = broker.bindings_for_thread(&env, 1, ScanDirection::Inclusive).unwrap();

        let chunk = partitioner.chunk_for(20, 1).unwrap();
        let cache =
            LocalAccumulator::new(&sum, &partitioner).accumulate(chunk, &body, &mut bindings);

        assert_eq!(cache.records.len(), 10);
        assert_eq!(cache.local_total, (10..20).sum::<i64>());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_records_capture_guarded_writes() {
        let mut env = DataEnvironment::new();
        let z = env.declare("z", 0i32);
        let clauses = DataClauses::new().lastprivate_conditional(z);
        let broker = PrivateVariableBroker::new(&env, &clauses).unwrap();
        let mut bindings = broker.bindings_for_thread(&env, 0, ScanDirection::Inclusive).unwrap();
        let body = PhasedBody::<_, _, i32>::new(
            move |i, vars| {
                if i % 3 == 0 {
                    vars.set(z, i as i32);
                }
                1u32
            },
            |_, _, _| {},
        );
        let product = ReductionOperator::<u32>::Product.resolve();
        let partitioner = IterationPartitioner::new(1, 4).unwrap();
        let chunk = partitioner.chunk_for(7, 0).unwrap();
        let cache =
            LocalAccumulator::new(&product, &partitioner).accumulate(chunk, &body, &mut bindings);

        let guarded: Vec<bool> = cache.records.iter().map(|r| r.wrote_privates()).collect();
        assert_eq!(guarded, vec![true, false, false, true, false, false, true]);
        assert_eq!(cache.local_total, 1);
        assert_eq!(cache.entry_values, vec![0]);
    }
}
