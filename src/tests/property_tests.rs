/// Property tests: team execution matches a sequential fold for every
/// operator, direction, team size and lane width.

#[cfg(test)]
mod tests {
    use crate::config::{CrossScanStrategy, ScanConfig, ScanDirection};
    use crate::operator::{Combiner, ReductionOperator};
    use crate::privatization::{DataClauses, DataEnvironment};
    use crate::scan::{from_fn, PhasedBody, ScanLoop};
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn sequential(
        combiner: &Combiner<i64>,
        direction: ScanDirection,
        values: &[i64],
    ) -> (Vec<i64>, i64) {
        let mut running = combiner.identity();
        let mut output = Vec::with_capacity(values.len());
        for &v in values {
            let next = combiner.combine(running, v);
            output.push(match direction {
                ScanDirection::Inclusive => next,
                ScanDirection::Exclusive => running,
            });
            running = next;
        }
        (output, running)
    }

    fn run(
        combiner: &Combiner<i64>,
        direction: ScanDirection,
        values: &[i64],
        config: ScanConfig,
    ) -> (Vec<i64>, i64) {
        let mut output = vec![0; values.len()];
        let mut reduction = combiner.identity();
        let outcome = ScanLoop::new(combiner.clone(), direction)
            .with_config(config)
            .execute(
                values.len(),
                &from_fn(|i: usize| values[i]),
                &mut output,
                &mut reduction,
                &mut DataEnvironment::new(),
            )
            .unwrap();
        assert_eq!(outcome.total, reduction);
        (output, reduction)
    }

    fn direction_strategy() -> impl Strategy<Value = ScanDirection> {
        prop_oneof![Just(ScanDirection::Inclusive), Just(ScanDirection::Exclusive)]
    }

    fn cross_scan_strategy() -> impl Strategy<Value = CrossScanStrategy> {
        prop_oneof![Just(CrossScanStrategy::Designated), Just(CrossScanStrategy::Redundant)]
    }

    #[test]
    fn test_exclusive_is_shifted_inclusive() {
        let mut rng = ChaCha20Rng::seed_from_u64(0x5ca9);
        let values: Vec<i64> = (0..5000).map(|_| rng.gen_range(-1000..1000)).collect();
        let config = ScanConfig::default().with_num_threads(6).with_simdlen(8);

        for operator in ReductionOperator::<i64>::builtins() {
            let combiner = operator.resolve();
            let (inclusive, total_in) =
                run(&combiner, ScanDirection::Inclusive, &values, config.clone());
            let (exclusive, total_ex) =
                run(&combiner, ScanDirection::Exclusive, &values, config.clone());
            assert_eq!(total_in, total_ex, "{}", operator.name());
            assert_eq!(exclusive[0], operator.identity(), "{}", operator.name());
            assert_eq!(&exclusive[1..], &inclusive[..values.len() - 1], "{}", operator.name());
        }
    }

    #[test]
    fn test_seeded_private_replay() {
        // A private written by the input phase and read by the scan phase
        // exercises snapshot restore and replay across lane groups.
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let values: Vec<i32> = (0..777).map(|_| rng.gen_range(0..50)).collect();
        let xor = ReductionOperator::<i32>::BitXor.resolve();

        let configs = [
            ScanConfig::default().with_if(false),
            ScanConfig::default().with_num_threads(1).with_simdlen(1),
            ScanConfig::default().with_num_threads(3).with_simdlen(4),
            ScanConfig::default().with_num_threads(8).with_simdlen(16),
            ScanConfig::default().with_num_threads(5).with_simdlen(7),
        ];
        for direction in [ScanDirection::Inclusive, ScanDirection::Exclusive] {
            for config in configs.iter().cloned() {
                let label = format!("{:?} {:?}", direction, config);
                let mut env = DataEnvironment::new();
                let acc = env.declare("acc", 0i32);
                let seen: Vec<AtomicI32> = (0..values.len()).map(|_| AtomicI32::new(-1)).collect();
                let body = PhasedBody::<_, _, i32>::new(
                    |i, vars| {
                        vars.set(acc, values[i]);
                        values[i]
                    },
                    |i, prefix, vars| {
                        seen[i].store(prefix * 1000 + *vars.get(acc), Ordering::Relaxed);
                    },
                );
                let mut output = vec![0; values.len()];
                let mut r = 0;
                let outcome = ScanLoop::new(xor.clone(), direction)
                    .with_config(config)
                    .with_clauses(DataClauses::new().private(acc))
                    .execute(values.len(), &body, &mut output, &mut r, &mut env)
                    .unwrap();

                let chunk_starts: Vec<usize> = outcome.chunks.iter().map(|c| c.start).collect();
                let mut running = 0;
                for (i, &v) in values.iter().enumerate() {
                    let next = xor.combine(running, v);
                    // A private read before any write in the thread sees the default.
                    let expected = match direction {
                        ScanDirection::Inclusive => next * 1000 + v,
                        ScanDirection::Exclusive if chunk_starts.contains(&i) => running * 1000,
                        ScanDirection::Exclusive => running * 1000 + values[i - 1],
                    };
                    let observed = seen[i].load(Ordering::Relaxed);
                    assert_eq!(observed, expected, "{}: iteration {}", label, i);
                    running = next;
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn test_team_matches_sequential(
            values in prop::collection::vec(-500i64..500, 0..300),
            op in 0usize..9,
            direction in direction_strategy(),
            threads in 1usize..9,
            lanes in 1usize..12,
            cross_scan in cross_scan_strategy(),
        ) {
            let operator = ReductionOperator::<i64>::builtins()[op].clone();
            let combiner = operator.resolve();
            let config = ScanConfig::default()
                .with_num_threads(threads)
                .with_simdlen(lanes)
                .with_cross_scan(cross_scan);
            let expected = sequential(&combiner, direction, &values);
            prop_assert_eq!(run(&combiner, direction, &values, config), expected);
        }

        #[test]
        fn test_serialized_matches_team(
            values in prop::collection::vec(-500i64..500, 1..200),
            op in 0usize..9,
            direction in direction_strategy(),
            threads in 2usize..6,
        ) {
            let combiner = ReductionOperator::<i64>::builtins()[op].resolve();
            let team = ScanConfig::default().with_num_threads(threads);
            let serial = team.clone().with_simd_if(false);
            prop_assert_eq!(
                run(&combiner, direction, &values, team),
                run(&combiner, direction, &values, serial)
            );
        }

        #[test]
        fn test_conditional_lastprivate_takes_last_guarded_write(
            guards in prop::collection::vec(any::<bool>(), 0..200),
            direction in direction_strategy(),
            threads in 1usize..7,
            lanes in 1usize..9,
        ) {
            let mut env = DataEnvironment::new();
            let z = env.declare("z", -7i64);
            let body = PhasedBody::<_, _, i64>::new(
                |i, vars| {
                    if guards[i] {
                        vars.set(z, 3 * i as i64);
                    }
                    1i64
                },
                |_, _, _| {},
            );
            let mut output = vec![0; guards.len()];
            let mut r = 0;
            ScanLoop::new(ReductionOperator::Sum, direction)
                .with_config(ScanConfig::default().with_num_threads(threads).with_simdlen(lanes))
                .with_clauses(DataClauses::new().lastprivate_conditional(z))
                .execute(guards.len(), &body, &mut output, &mut r, &mut env)
                .unwrap();

            let expected = guards.iter().rposition(|&g| g).map_or(-7, |i| 3 * i as i64);
            prop_assert_eq!(env.get(z), Some(&expected));
            prop_assert_eq!(r, guards.len() as i64);
        }
    }
}
