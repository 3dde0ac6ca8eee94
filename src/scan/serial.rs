//! The serialized construct (`if(0)`, `if(simd: 0)`): one worker, one lane,
//! phases interleaved exactly as written. No cache, no team, no barriers.

use super::ScanBody;
use crate::config::ScanDirection;
use crate::lastprivate::Phase;
use crate::operator::Combiner;
use crate::privatization::ThreadBindings;

pub struct SerialScan<'a, T> {
    combiner: &'a Combiner<T>,
    direction: ScanDirection,
}

impl<'a, T: Copy> SerialScan<'a, T> {
    pub fn new(combiner: &'a Combiner<T>, direction: ScanDirection) -> Self {
        Self {
            combiner,
            direction,
        }
    }

    /// Runs iterations `0..output.len()` in order and returns the total.
    pub fn run<B>(
        &self,
        body: &B,
        output: &mut [T],
        bindings: &mut ThreadBindings<'_, B::Value>,
    ) -> T
    where
        B: ScanBody<T> + ?Sized,
    {
        let mut running = self.combiner.identity();
        for (i, cell) in output.iter_mut().enumerate() {
            match self.direction {
                ScanDirection::Inclusive => {
                    bindings.enter(i, Phase::Input);
                    let value = body.input(i, bindings);
                    running = self.combiner.combine(running, value);
                    bindings.enter(i, Phase::Scan);
                    *cell = running;
                    body.scan(i, running, bindings);
                }
                ScanDirection::Exclusive => {
                    bindings.enter(i, Phase::Scan);
                    *cell = running;
                    body.scan(i, running, bindings);
                    bindings.enter(i, Phase::Input);
                    let value = body.input(i, bindings);
                    running = self.combiner.combine(running, value);
                }
            }
        }
        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ReductionOperator;
    use crate::privatization::{DataClauses, DataEnvironment, PrivateVariableBroker};
    use crate::scan::PhasedBody;
    use std::sync::Mutex;

    #[test]
    fn test_phase_interleaving_by_direction() {
        let env = DataEnvironment::<i32>::new();
        let broker = PrivateVariableBroker::new(&env, &DataClauses::new()).unwrap();
        let sum = ReductionOperator::<i32>::Sum.resolve();

        for (direction, expected) in [
            (ScanDirection::Inclusive, vec!["in0", "scan0", "in1", "scan1"]),
            (ScanDirection::Exclusive, vec!["scan0", "in0", "scan1", "in1"]),
        ] {
            let trace = Mutex::new(Vec::new());
            let body = PhasedBody::<_, _, i32>::new(
                |i, _| {
                    trace.lock().unwrap().push(format!("in{}", i));
                    1
                },
                |i, _, _| trace.lock().unwrap().push(format!("scan{}", i)),
            );
            let mut bindings = broker.bindings_for_thread(&env, 0, direction).unwrap();
            let mut output = vec![0; 2];
            let total = SerialScan::new(&sum, direction).run(&body, &mut output, &mut bindings);
            assert_eq!(total, 2);
            assert_eq!(trace.into_inner().unwrap(), expected);
        }
    }

    #[test]
    fn test_serial_concrete_sums() {
        let env = DataEnvironment::<i32>::new();
        let broker = PrivateVariableBroker::new(&env, &DataClauses::new()).unwrap();
        let sum = ReductionOperator::<i32>::Sum.resolve();
        let body = PhasedBody::<_, _, i32>::new(|i, _| 2 * i as i32, |_, _, _| {});

        let mut bindings = broker.bindings_for_thread(&env, 0, ScanDirection::Exclusive).unwrap();
        let mut output = vec![-1; 1024];
        let total =
            SerialScan::new(&sum, ScanDirection::Exclusive).run(&body, &mut output, &mut bindings);
        assert_eq!(total, 1024 * 1023);
        assert_eq!(output[0], 0);
        assert!((1..1024).all(|i| output[i] == (i * (i - 1)) as i32));
    }
}
