//! The dependency-tracking work queue that drives analysis to fixpoint.
//!
//! Units are the re-analyzable work items: a module's top level, or one
//! function body under one call context. While a unit runs it records the
//! `(scope, name)` bindings it reads; when any unit's write changes one of
//! those bindings, every reader is re-enqueued. Termination is guaranteed
//! by the re-analysis budget: past it, a unit's writes are force-widened
//! to `Any`, after which they can no longer change.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::module::ModuleId;
use crate::scope::ScopeId;
use crate::value::{ContextKey, FunctionId};

/// Handle to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u32);

/// The granularity of re-analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A module's top-level statements.
    ModuleTop(ModuleId),
    /// One function body under one call context.
    FunctionBody {
        function: FunctionId,
        context: ContextKey,
    },
}

/// A binding key in the dependency graph.
pub type BindingKey = (ScopeId, String);

#[derive(Debug)]
struct UnitInfo {
    kind: UnitKind,
    /// Completed runs.
    runs: u32,
    /// Past the re-analysis budget: writes are force-widened.
    exhausted: bool,
}

/// The work queue plus the read-dependency graph.
#[derive(Debug, Default)]
pub struct WorkQueue {
    units: Vec<UnitInfo>,
    by_kind: HashMap<UnitKind, UnitId>,
    pending: VecDeque<UnitId>,
    queued: HashSet<UnitId>,
    /// binding → units that read it.
    readers: HashMap<BindingKey, HashSet<UnitId>>,
    /// unit → bindings it reads (for clearing on re-run).
    unit_reads: HashMap<UnitId, HashSet<BindingKey>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a unit for `kind`, creating it on first sight.
    pub fn ensure_unit(&mut self, kind: UnitKind) -> UnitId {
        if let Some(id) = self.by_kind.get(&kind) {
            return *id;
        }
        let id = UnitId(self.units.len() as u32);
        self.units.push(UnitInfo {
            kind: kind.clone(),
            runs: 0,
            exhausted: false,
        });
        self.by_kind.insert(kind, id);
        id
    }

    pub fn kind(&self, id: UnitId) -> &UnitKind {
        &self.units[id.0 as usize].kind
    }

    /// Schedule a unit unless it is already pending.
    pub fn enqueue(&mut self, id: UnitId) {
        if self.queued.insert(id) {
            self.pending.push_back(id);
        }
    }

    /// Take the next unit to run, clearing its stale read edges and
    /// counting the run against its budget.
    pub fn pop(&mut self) -> Option<UnitId> {
        let id = self.pending.pop_front()?;
        self.queued.remove(&id);
        if let Some(reads) = self.unit_reads.remove(&id) {
            for key in reads {
                if let Some(readers) = self.readers.get_mut(&key) {
                    readers.remove(&id);
                }
            }
        }
        self.units[id.0 as usize].runs += 1;
        Some(id)
    }

    /// How many times a unit has run.
    pub fn runs(&self, id: UnitId) -> u32 {
        self.units[id.0 as usize].runs
    }

    /// Whether a unit has exceeded its budget and writes force-widened.
    pub fn is_exhausted(&self, id: UnitId) -> bool {
        self.units[id.0 as usize].exhausted
    }

    /// Mark a unit as past its re-analysis budget.
    pub fn mark_exhausted(&mut self, id: UnitId) {
        self.units[id.0 as usize].exhausted = true;
    }

    /// Record that `unit` read `binding`.
    pub fn record_read(&mut self, unit: UnitId, binding: BindingKey) {
        self.readers.entry(binding.clone()).or_default().insert(unit);
        self.unit_reads.entry(unit).or_default().insert(binding);
    }

    /// A write to `binding` changed its value set: re-enqueue all readers
    /// except `writer` itself (its own reads are refreshed on its next
    /// scheduled run anyway).
    pub fn notify_write(&mut self, binding: &BindingKey, writer: UnitId) {
        let Some(readers) = self.readers.get(binding) else {
            return;
        };
        let to_enqueue: Vec<UnitId> = readers
            .iter()
            .copied()
            .filter(|reader| *reader != writer)
            .collect();
        for reader in to_enqueue {
            self.enqueue(reader);
        }
    }

    /// Whether any work is pending.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Total number of units ever created.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Drop all pending work (cancellation).
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_unit(queue: &mut WorkQueue, id: u32) -> UnitId {
        queue.ensure_unit(UnitKind::ModuleTop(ModuleId(id)))
    }

    #[test]
    fn units_are_interned_by_kind() {
        let mut queue = WorkQueue::new();
        let a = module_unit(&mut queue, 0);
        let b = module_unit(&mut queue, 0);
        let c = module_unit(&mut queue, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn enqueue_deduplicates() {
        let mut queue = WorkQueue::new();
        let a = module_unit(&mut queue, 0);
        queue.enqueue(a);
        queue.enqueue(a);
        assert_eq!(queue.pop(), Some(a));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn write_notification_reenqueues_readers() {
        let mut queue = WorkQueue::new();
        let reader = module_unit(&mut queue, 0);
        let writer = module_unit(&mut queue, 1);
        let binding = (ScopeId(0), "x".to_string());
        queue.record_read(reader, binding.clone());
        queue.notify_write(&binding, writer);
        assert_eq!(queue.pop(), Some(reader));
        // The writer itself is not re-enqueued.
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn reads_are_cleared_on_pop() {
        let mut queue = WorkQueue::new();
        let reader = module_unit(&mut queue, 0);
        let writer = module_unit(&mut queue, 1);
        let binding = (ScopeId(0), "x".to_string());
        queue.record_read(reader, binding.clone());
        queue.enqueue(reader);
        assert_eq!(queue.pop(), Some(reader));
        // The pop cleared the read edge; a write no longer re-enqueues.
        queue.notify_write(&binding, writer);
        assert!(!queue.has_pending());
    }

    #[test]
    fn run_counting_and_exhaustion() {
        let mut queue = WorkQueue::new();
        let a = module_unit(&mut queue, 0);
        queue.enqueue(a);
        queue.pop();
        queue.enqueue(a);
        queue.pop();
        assert_eq!(queue.runs(a), 2);
        assert!(!queue.is_exhausted(a));
        queue.mark_exhausted(a);
        assert!(queue.is_exhausted(a));
    }
}
