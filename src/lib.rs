//! Team-parallel inscan reductions.
//!
//! A scan loop computes, for every iteration `i`, the reduction of the
//! contributions of iterations `0..=i` (inclusive) or `0..i` (exclusive),
//! while the iteration space is shared by a team of workers that each walk
//! their chunk in vector lane groups. Results are identical to a sequential
//! run for every team size and lane width.

pub mod config;
pub mod error;
pub mod lastprivate;
pub mod operator;
pub mod partition;
pub mod privatization;
pub mod scan;
pub mod team;

#[cfg(test)]
mod tests;

pub use config::{CrossScanStrategy, ScanConfig, ScanDirection, DEFAULT_SIMDLEN};
pub use error::{Result, ScanError};
pub use lastprivate::{ConditionalLastprivateTracker, LastprivateKind, LastprivateSlot, Phase};
pub use operator::{Combiner, CustomOperator, ReductionOperator, ScanValue};
pub use partition::{partition, partition_lanes, ChunkDescriptor, IterationPartitioner, LaneGroup};
pub use privatization::{
    DataClause, DataClauses, DataEnvironment, PrivateVariableBroker, ThreadBindings, VarId,
};
pub use scan::{from_fn, ExecutionMode, PhasedBody, ScanBody, ScanLoop, ScanOutcome};
pub use team::{TeamContext, ThreadTeam};

/// Scans `values` with `operator`, returning the scan values and the total.
///
/// Convenience wrapper for a body that just reads an input slice; runs on a
/// fresh team sized by `config`.
pub fn scan_slice<T>(
    operator: impl Into<Combiner<T>>,
    direction: ScanDirection,
    values: &[T],
    config: &ScanConfig,
) -> Result<(Vec<T>, T)>
where
    T: Copy + Send + Sync + std::fmt::Debug,
{
    let scan = ScanLoop::new(operator, direction).with_config(config.clone());
    let mut output = Vec::with_capacity(values.len());
    output.extend_from_slice(values);
    let mut total = scan.combiner().identity();
    let mut env = DataEnvironment::new();
    scan.execute(values.len(), &from_fn(|i: usize| values[i]), &mut output, &mut total, &mut env)?;
    Ok((output, total))
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_scan_slice_inclusive_sum() {
        let values: Vec<i32> = (0..1024).collect();
        let config = ScanConfig::default().with_num_threads(4).with_simdlen(8);
        let (output, total) =
            scan_slice(ReductionOperator::Sum, ScanDirection::Inclusive, &values, &config).unwrap();
        assert_eq!(total, 1024 * 1023 / 2);
        assert!(output.iter().enumerate().all(|(i, &s)| s == (i * (i + 1) / 2) as i32));
    }

    #[test]
    fn test_scan_slice_rejects_zero_threads() {
        let config = ScanConfig::default().with_num_threads(0);
        let result = scan_slice(
            ReductionOperator::<i32>::Sum,
            ScanDirection::Inclusive,
            &[1, 2, 3],
            &config,
        );
        assert!(matches!(result, Err(ScanError::InvalidTeamSize(0))));
    }
}
