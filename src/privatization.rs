//! Data-sharing for scan loops: shared originals, the clause list, and the
//! per-thread private bindings handed to the loop body.
//!
//! The [`PrivateVariableBroker`] validates the clauses once per construct,
//! builds one [`ThreadBindings`] per worker (firstprivate copies are taken
//! once per thread, independent of chunk size) and, after the team joins,
//! writes each lastprivate winner back to its original exactly once.

use crate::config::ScanDirection;
use crate::error::{Result, ScanError};
use crate::lastprivate::{
    ConditionalLastprivateTracker, LastprivateKind, LastprivateSlot, Phase, Stamp,
    ThreadCandidate,
};
use log::debug;

/// Handle to a variable declared in a [`DataEnvironment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Shared originals visible to the enclosing code.
#[derive(Debug, Clone, Default)]
pub struct DataEnvironment<V> {
    names: Vec<String>,
    originals: Vec<V>,
}

impl<V> DataEnvironment<V> {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            originals: Vec::new(),
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, value: V) -> VarId {
        self.names.push(name.into());
        self.originals.push(value);
        VarId(self.originals.len() - 1)
    }

    pub fn get(&self, var: VarId) -> Option<&V> {
        self.originals.get(var.0)
    }

    pub fn set(&mut self, var: VarId, value: V) -> Result<()> {
        let slot = self
            .originals
            .get_mut(var.0)
            .ok_or(ScanError::UnknownVariable(var.0))?;
        *slot = value;
        Ok(())
    }

    pub fn name(&self, var: VarId) -> Option<&str> {
        self.names.get(var.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataClause {
    Private,
    Firstprivate,
    Lastprivate,
    ConditionalLastprivate,
}

/// Clause list of one construct, e.g.
/// `firstprivate(x) private(y) lastprivate(conditional: z)`.
#[derive(Debug, Clone, Default)]
pub struct DataClauses {
    clauses: Vec<(VarId, DataClause)>,
}

impl DataClauses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn private(self, var: VarId) -> Self {
        self.with(var, DataClause::Private)
    }

    pub fn firstprivate(self, var: VarId) -> Self {
        self.with(var, DataClause::Firstprivate)
    }

    pub fn lastprivate(self, var: VarId) -> Self {
        self.with(var, DataClause::Lastprivate)
    }

    pub fn lastprivate_conditional(self, var: VarId) -> Self {
        self.with(var, DataClause::ConditionalLastprivate)
    }

    pub fn with(mut self, var: VarId, clause: DataClause) -> Self {
        self.clauses.push((var, clause));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(VarId, DataClause)> {
        self.clauses.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrivateInit {
    Default,
    CopyIn,
}

#[derive(Debug, Clone, Copy)]
struct PrivateLayout {
    var: VarId,
    init: PrivateInit,
    last: Option<LastprivateKind>,
}

/// One private write made by an input phase, cached for replay.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PrivateWrite<V> {
    slot: usize,
    value: V,
}

/// Per-construct layout of the privatized variables.
#[derive(Debug, Clone)]
pub struct PrivateVariableBroker {
    layouts: Vec<PrivateLayout>,
    slot_of: Vec<Option<usize>>,
}

impl PrivateVariableBroker {
    /// Validates `clauses` against `env` and fixes the slot layout.
    pub fn new<V>(env: &DataEnvironment<V>, clauses: &DataClauses) -> Result<Self> {
        let mut layouts: Vec<PrivateLayout> = Vec::new();
        let mut slot_of = vec![None; env.len()];

        for &(var, clause) in clauses.iter() {
            let name = env.name(var).ok_or(ScanError::UnknownVariable(var.0))?;
            let conflict = |reason: &str| ScanError::ConflictingClauses {
                name: name.to_string(),
                reason: reason.to_string(),
            };

            let slot = match slot_of[var.0] {
                Some(slot) => slot,
                None => {
                    layouts.push(PrivateLayout {
                        var,
                        init: PrivateInit::Default,
                        last: None,
                    });
                    slot_of[var.0] = Some(layouts.len() - 1);
                    layouts.len() - 1
                }
            };
            let layout = &mut layouts[slot];

            match clause {
                DataClause::Private => {
                    if clauses.iter().filter(|(v, _)| *v == var).count() > 1 {
                        return Err(conflict("private cannot be combined with other clauses"));
                    }
                }
                DataClause::Firstprivate => {
                    if layout.init == PrivateInit::CopyIn {
                        return Err(conflict("listed in firstprivate twice"));
                    }
                    layout.init = PrivateInit::CopyIn;
                }
                DataClause::Lastprivate | DataClause::ConditionalLastprivate => {
                    if layout.last.is_some() {
                        return Err(conflict("listed in lastprivate twice"));
                    }
                    layout.last = Some(if clause == DataClause::Lastprivate {
                        LastprivateKind::Unconditional
                    } else {
                        LastprivateKind::Conditional
                    });
                }
            }
        }

        Ok(Self { layouts, slot_of })
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Private bindings for one worker, taken before its first pass.
    pub fn bindings_for_thread<'b, V>(
        &'b self,
        env: &DataEnvironment<V>,
        thread_id: usize,
        direction: ScanDirection,
    ) -> Result<ThreadBindings<'b, V>>
    where
        V: Clone + Default,
    {
        let values = self
            .layouts
            .iter()
            .map(|layout| match layout.init {
                PrivateInit::CopyIn => env
                    .get(layout.var)
                    .cloned()
                    .ok_or(ScanError::UnknownVariable(layout.var.0)),
                PrivateInit::Default => Ok(V::default()),
            })
            .collect::<Result<Vec<V>>>()?;
        Ok(ThreadBindings {
            broker: self,
            thread_id,
            last: vec![LastprivateSlot::default(); values.len()],
            values,
            direction,
            stamp: Stamp::new(0, Phase::Input, direction),
            write_log: None,
        })
    }

    /// Resolves every lastprivate variable and copies the winner back.
    ///
    /// Returns the variables whose originals were updated.
    pub fn finalize<V: Clone>(
        &self,
        env: &mut DataEnvironment<V>,
        reports: Vec<ThreadReport<V>>,
        last_owner: Option<usize>,
    ) -> Result<Vec<VarId>> {
        let mut per_slot: Vec<Vec<ThreadCandidate<V>>> = vec![Vec::new(); self.layouts.len()];
        for report in reports {
            let thread_id = report.thread_id;
            let slots = report.last.into_iter().zip(report.values);
            for (slot, (last, final_value)) in slots.enumerate() {
                if self.layouts[slot].last.is_some() {
                    per_slot[slot].push(ThreadCandidate {
                        thread_id,
                        slot: last,
                        final_value,
                    });
                }
            }
        }

        let mut updated = Vec::new();
        for (layout, candidates) in self.layouts.iter().zip(per_slot) {
            let Some(kind) = layout.last else { continue };
            let winner = ConditionalLastprivateTracker::new(kind).resolve(&candidates, last_owner);
            if let Some(value) = winner {
                env.set(layout.var, value)?;
                updated.push(layout.var);
            }
        }
        debug!("lastprivate copy-back updated {} variable(s)", updated.len());
        Ok(updated)
    }

    fn slot(&self, var: VarId) -> Option<usize> {
        self.slot_of.get(var.0).copied().flatten()
    }
}

/// A worker's private copies for the duration of one construct.
///
/// Handed to the loop body; every write to a lastprivate variable is stamped
/// with the current iteration and phase.
#[derive(Debug)]
pub struct ThreadBindings<'b, V> {
    broker: &'b PrivateVariableBroker,
    thread_id: usize,
    values: Vec<V>,
    last: Vec<LastprivateSlot<V>>,
    direction: ScanDirection,
    stamp: Stamp,
    write_log: Option<Vec<PrivateWrite<V>>>,
}

impl<'b, V: Clone> ThreadBindings<'b, V> {
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    /// Iteration the body is currently executing.
    pub fn iteration(&self) -> usize {
        self.stamp.iteration
    }

    pub fn phase(&self) -> Phase {
        self.stamp.phase
    }

    pub fn try_get(&self, var: VarId) -> Option<&V> {
        self.broker.slot(var).map(|slot| &self.values[slot])
    }

    /// Current value of this thread's copy of `var`.
    ///
    /// # Panics
    /// If `var` is not listed in any data-sharing clause of the construct.
    pub fn get(&self, var: VarId) -> &V {
        match self.try_get(var) {
            Some(value) => value,
            None => panic!("variable #{} is not privatized in this construct", var.0),
        }
    }

    /// Assigns this thread's copy of `var`.
    ///
    /// For a conditional lastprivate variable, calling `set` is what makes the
    /// guard count: only executed assignments are candidates.
    ///
    /// # Panics
    /// If `var` is not listed in any data-sharing clause of the construct.
    pub fn set(&mut self, var: VarId, value: V) {
        let Some(slot) = self.broker.slot(var) else {
            panic!("variable #{} is not privatized in this construct", var.0);
        };
        if self.broker.layouts[slot].last.is_some() {
            self.last[slot].record(self.stamp, value.clone());
        }
        if let Some(log) = self.write_log.as_mut() {
            log.push(PrivateWrite {
                slot,
                value: value.clone(),
            });
        }
        self.values[slot] = value;
    }

    pub(crate) fn enter(&mut self, iteration: usize, phase: Phase) {
        self.stamp = Stamp::new(iteration, phase, self.direction);
    }

    pub(crate) fn snapshot(&self) -> Vec<V> {
        self.values.clone()
    }

    pub(crate) fn restore(&mut self, snapshot: &[V]) {
        self.values.clone_from_slice(snapshot);
    }

    pub(crate) fn begin_recording(&mut self) {
        self.write_log = Some(Vec::new());
    }

    pub(crate) fn take_writes(&mut self) -> Vec<PrivateWrite<V>> {
        self.write_log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub(crate) fn end_recording(&mut self) {
        self.write_log = None;
    }

    /// Restores the writes one input phase made, without re-stamping them.
    pub(crate) fn replay(&mut self, writes: &[PrivateWrite<V>]) {
        for write in writes {
            self.values[write.slot] = write.value.clone();
        }
    }

    pub fn finish(self) -> ThreadReport<V> {
        ThreadReport {
            thread_id: self.thread_id,
            values: self.values,
            last: self.last,
        }
    }
}

/// What a worker hands back on join for lastprivate resolution.
#[derive(Debug, Clone)]
pub struct ThreadReport<V> {
    pub thread_id: usize,
    values: Vec<V>,
    last: Vec<LastprivateSlot<V>>,
}
