//! The scan loop construct.
//!
//! A parallel construct runs in two passes separated by two team barriers:
//!
//! 1. every worker executes the input phase of its chunk once, caching each
//!    iteration's contribution and private writes, and publishes its total;
//! 2. (barrier) thread offsets are the exclusive prefix of the totals;
//! 3. (barrier) every worker rewalks its cache from its offset, writes the
//!    scan values and runs the scan phase of each iteration.
//!
//! After the team joins, the reduction original absorbs the grand total and
//! lastprivate winners are copied back. The serialized construct skips all
//! of this and runs the body in plain iteration order.

pub mod accumulate;
pub mod apply;
pub mod cross_thread;
pub mod lanes;
pub mod serial;

use crate::config::{ScanConfig, ScanDirection};
use crate::error::{Result, ScanError};
use crate::operator::Combiner;
use crate::partition::{ChunkDescriptor, IterationPartitioner};
use crate::privatization::{
    DataClauses, DataEnvironment, PrivateVariableBroker, ThreadBindings, ThreadReport, VarId,
};
use crate::team::{TeamContext, ThreadTeam};
use accumulate::{ChunkCache, LocalAccumulator};
use apply::SecondPassApplier;
use cross_thread::{CrossThreadScanner, SharedScanState};
use log::{debug, trace};
use serial::SerialScan;
use std::marker::PhantomData;
use std::sync::Mutex;

/// The loop body of a scan construct, split at the scan directive.
///
/// `input` is the part that contributes to the reduction and `scan` the part
/// that observes the scan value. The engine runs each phase exactly once per
/// iteration; a parallel construct runs all input phases of a chunk before
/// any of its scan phases.
pub trait ScanBody<T>: Sync {
    /// Value type of the privatized variables.
    type Value: Clone + Default + Send + Sync;

    fn input(&self, iteration: usize, vars: &mut ThreadBindings<'_, Self::Value>) -> T;

    fn scan(&self, _iteration: usize, _prefix: T, _vars: &mut ThreadBindings<'_, Self::Value>) {}
}

/// A body built from two closures.
pub struct PhasedBody<I, S, V> {
    input: I,
    scan: S,
    _values: PhantomData<fn() -> V>,
}

impl<I, S, V> PhasedBody<I, S, V> {
    pub fn new<T>(input: I, scan: S) -> Self
    where
        I: Fn(usize, &mut ThreadBindings<'_, V>) -> T + Sync,
        S: Fn(usize, T, &mut ThreadBindings<'_, V>) + Sync,
    {
        Self {
            input,
            scan,
            _values: PhantomData,
        }
    }
}

impl<T, I, S, V> ScanBody<T> for PhasedBody<I, S, V>
where
    I: Fn(usize, &mut ThreadBindings<'_, V>) -> T + Sync,
    S: Fn(usize, T, &mut ThreadBindings<'_, V>) + Sync,
    V: Clone + Default + Send + Sync,
{
    type Value = V;

    fn input(&self, iteration: usize, vars: &mut ThreadBindings<'_, V>) -> T {
        (self.input)(iteration, vars)
    }

    fn scan(&self, iteration: usize, prefix: T, vars: &mut ThreadBindings<'_, V>) {
        (self.scan)(iteration, prefix, vars)
    }
}

/// A body with no private variables whose scan values only go to the
/// output buffer.
pub struct InputFn<F>(F);

pub fn from_fn<T, F>(f: F) -> InputFn<F>
where
    F: Fn(usize) -> T + Sync,
{
    InputFn(f)
}

impl<T, F> ScanBody<T> for InputFn<F>
where
    F: Fn(usize) -> T + Sync,
{
    type Value = ();

    fn input(&self, iteration: usize, _vars: &mut ThreadBindings<'_, ()>) -> T {
        (self.0)(iteration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Two-pass team execution with lane groups.
    Parallel { team_size: usize, simdlen: usize },
    /// Serialized by an `if` clause.
    Serial,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome<T> {
    /// Reduction of every iteration's contribution (excluding the original).
    pub total: T,
    pub mode: ExecutionMode,
    pub chunks: Vec<ChunkDescriptor>,
    /// Lastprivate variables whose originals were written back.
    pub updated: Vec<VarId>,
}

/// One scan loop construct: operator, direction, configuration and
/// data-sharing clauses. Reusable across runs.
#[derive(Debug, Clone)]
pub struct ScanLoop<T> {
    combiner: Combiner<T>,
    direction: ScanDirection,
    config: ScanConfig,
    clauses: DataClauses,
}

impl<T> ScanLoop<T>
where
    T: Copy + Send + Sync + std::fmt::Debug,
{
    pub fn new(operator: impl Into<Combiner<T>>, direction: ScanDirection) -> Self {
        Self {
            combiner: operator.into(),
            direction,
            config: ScanConfig::default(),
            clauses: DataClauses::new(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clauses(mut self, clauses: DataClauses) -> Self {
        self.clauses = clauses;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    pub fn combiner(&self) -> &Combiner<T> {
        &self.combiner
    }

    /// Builds a team of `config.num_threads` and runs the construct on it.
    pub fn execute<B>(
        &self,
        iterations: usize,
        body: &B,
        output: &mut [T],
        reduction: &mut T,
        env: &mut DataEnvironment<B::Value>,
    ) -> Result<ScanOutcome<T>>
    where
        B: ScanBody<T>,
    {
        self.config.validate()?;
        if self.config.is_serialized() {
            return self.run_serial(iterations, body, output, reduction, env);
        }
        let team = ThreadTeam::new(self.config.num_threads)?;
        self.run(&team, iterations, body, output, reduction, env)
    }

    /// Runs the construct on an existing team.
    ///
    /// Everything that can fail is checked before the body runs: the output
    /// length, the lane width and the clause list.
    pub fn run<B>(
        &self,
        team: &ThreadTeam,
        iterations: usize,
        body: &B,
        output: &mut [T],
        reduction: &mut T,
        env: &mut DataEnvironment<B::Value>,
    ) -> Result<ScanOutcome<T>>
    where
        B: ScanBody<T>,
    {
        if self.config.is_serialized() {
            return self.run_serial(iterations, body, output, reduction, env);
        }
        check_output(iterations, output)?;
        let partitioner = IterationPartitioner::new(team.size(), self.config.simdlen)?;
        let broker = PrivateVariableBroker::new(env, &self.clauses)?;
        debug!(
            "inscan({}) {:?} scan over {} iterations: team {}, simdlen {}, {:?} cross-thread scan",
            self.combiner.name(),
            self.direction,
            iterations,
            team.size(),
            self.config.simdlen,
            self.config.cross_scan
        );

        let chunks = partitioner.chunks(iterations);
        let shared = SharedScanState::new(team.size());
        let mut slots = Vec::with_capacity(chunks.len());
        let mut rest: &mut [T] = output;
        for chunk in &chunks {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(chunk.len());
            slots.push(Mutex::new(Some(head)));
            rest = tail;
        }

        let plan = TeamPlan {
            iterations,
            partitioner: &partitioner,
            shared: &shared,
            slots: &slots,
            broker: &broker,
            env: &*env,
        };
        let reports = team
            .run(|ctx| self.worker(ctx, &plan, body))
            .into_iter()
            .collect::<Result<Vec<ThreadReport<B::Value>>>>()?;

        let total = shared
            .grand_total()
            .ok_or(ScanError::MissingGrandTotal)?;
        *reduction = self.combiner.combine(*reduction, total);
        let updated = broker.finalize(env, reports, partitioner.last_iteration_owner(iterations))?;
        debug!("inscan({}) finished with total {:?}", self.combiner.name(), total);

        Ok(ScanOutcome {
            total,
            mode: ExecutionMode::Parallel {
                team_size: team.size(),
                simdlen: self.config.simdlen,
            },
            chunks,
            updated,
        })
    }

    fn run_serial<B>(
        &self,
        iterations: usize,
        body: &B,
        output: &mut [T],
        reduction: &mut T,
        env: &mut DataEnvironment<B::Value>,
    ) -> Result<ScanOutcome<T>>
    where
        B: ScanBody<T>,
    {
        check_output(iterations, output)?;
        if self.config.simdlen == 0 {
            return Err(ScanError::InvalidLaneWidth(0));
        }
        let broker = PrivateVariableBroker::new(env, &self.clauses)?;
        debug!(
            "inscan({}) {:?} scan over {} iterations serialized by if clause",
            self.combiner.name(),
            self.direction,
            iterations
        );

        let mut bindings = broker.bindings_for_thread(env, 0, self.direction)?;
        let total =
            SerialScan::new(&self.combiner, self.direction).run(body, output, &mut bindings);
        let reports = vec![bindings.finish()];

        *reduction = self.combiner.combine(*reduction, total);
        let last_owner = (iterations > 0).then_some(0);
        let updated = broker.finalize(env, reports, last_owner)?;

        Ok(ScanOutcome {
            total,
            mode: ExecutionMode::Serial,
            chunks: vec![ChunkDescriptor {
                thread_id: 0,
                start: 0,
                end: iterations,
            }],
            updated,
        })
    }

    /// One worker's part of the two-pass protocol.
    ///
    /// Both barriers are reached on every path so a failing worker reports
    /// its error instead of stranding the rest of the team.
    fn worker<B>(
        &self,
        ctx: &TeamContext<'_>,
        plan: &TeamPlan<'_, '_, T, B::Value>,
        body: &B,
    ) -> Result<ThreadReport<B::Value>>
    where
        B: ScanBody<T>,
    {
        let thread_id = ctx.thread_id;
        let first = self.first_pass(thread_id, plan, body);
        if let Ok((_, cache)) = &first {
            trace!(
                "thread {} accumulated {} iterations in {:?}",
                thread_id,
                cache.records.len(),
                cache.chunk.range()
            );
        }
        ctx.barrier();

        let scanned = CrossThreadScanner::new(&self.combiner, self.config.cross_scan)
            .scan(plan.shared, thread_id);
        ctx.barrier();

        let (mut bindings, cache) = first?;
        scanned?;
        let offset = plan.shared.offset(thread_id)?;
        let output = plan
            .slots
            .get(thread_id)
            .and_then(|slot| slot.lock().unwrap_or_else(|p| p.into_inner()).take())
            .ok_or(ScanError::SlotAlreadyPublished { thread: thread_id })?;

        SecondPassApplier::new(&self.combiner, plan.partitioner, self.direction)
            .apply(&cache, offset, output, body, &mut bindings);
        Ok(bindings.finish())
    }

    fn first_pass<'p, B>(
        &self,
        thread_id: usize,
        plan: &TeamPlan<'p, '_, T, B::Value>,
        body: &B,
    ) -> Result<(ThreadBindings<'p, B::Value>, ChunkCache<T, B::Value>)>
    where
        B: ScanBody<T>,
    {
        let chunk = plan.partitioner.chunk_for(plan.iterations, thread_id)?;
        let mut bindings = plan
            .broker
            .bindings_for_thread(plan.env, thread_id, self.direction)?;
        let cache = LocalAccumulator::new(&self.combiner, plan.partitioner)
            .accumulate(chunk, body, &mut bindings);
        plan.shared.publish_total(thread_id, cache.local_total)?;
        Ok((bindings, cache))
    }
}

/// Read-only state every worker of one parallel construct shares.
struct TeamPlan<'p, 'o, T, V> {
    iterations: usize,
    partitioner: &'p IterationPartitioner,
    shared: &'p SharedScanState<T>,
    /// Each thread's disjoint window of the output buffer, taken once.
    slots: &'p [Mutex<Option<&'o mut [T]>>],
    broker: &'p PrivateVariableBroker,
    env: &'p DataEnvironment<V>,
}

fn check_output<T>(iterations: usize, output: &[T]) -> Result<()> {
    if output.len() != iterations {
        return Err(ScanError::OutputLengthMismatch {
            expected: iterations,
            got: output.len(),
        });
    }
    Ok(())
}
