//! Transition tables
//!
//! A table lists every legal move of one entity kind. Anything not listed is
//! rejected, so the full graph can be read (and tested) in one place.

use super::Operation;
use super::status::{InfrastructureStatus, LifecycleStatus, RunStatus};

/// Timestamp written when an edge is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// No timestamp changes
    None,
    /// Sets `started_at` unless it is already set
    Started,
    /// Sets `completed_at`
    Completed,
}

/// One legal move: `from --operation--> to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<S> {
    pub from: S,
    pub operation: Operation,
    pub to: S,
    pub stamp: Stamp,
}

const fn edge<S>(from: S, operation: Operation, to: S, stamp: Stamp) -> Edge<S> {
    Edge {
        from,
        operation,
        to,
        stamp,
    }
}

/// Exhaustive list of edges for one entity kind
#[derive(Debug)]
pub struct TransitionTable<S: 'static> {
    edges: &'static [Edge<S>],
}

impl<S> TransitionTable<S> {
    pub const fn new(edges: &'static [Edge<S>]) -> Self {
        Self { edges }
    }

    pub fn edges(&self) -> &'static [Edge<S>] {
        self.edges
    }
}

impl<S: LifecycleStatus> TransitionTable<S> {
    /// Find the edge leaving `from` for `operation`
    pub fn lookup(&self, from: S, operation: Operation) -> Option<&'static Edge<S>> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.operation == operation)
    }

    /// A state is terminal when no edge leaves it
    pub fn is_terminal(&self, status: S) -> bool {
        !self.edges.iter().any(|e| e.from == status)
    }

    /// Operations that are legal from `status`
    pub fn operations_from(&self, status: S) -> impl Iterator<Item = Operation> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == status)
            .map(|e| e.operation)
    }
}

const RUN_EDGES: &[Edge<RunStatus>] = &[
    edge(RunStatus::Pending, Operation::Start, RunStatus::InProgress, Stamp::Started),
    edge(RunStatus::InProgress, Operation::Complete, RunStatus::Completed, Stamp::Completed),
    edge(RunStatus::InProgress, Operation::Fail, RunStatus::Failed, Stamp::Completed),
    edge(RunStatus::Pending, Operation::Cancel, RunStatus::Cancelled, Stamp::Completed),
    edge(RunStatus::InProgress, Operation::Cancel, RunStatus::Cancelled, Stamp::Completed),
];

/// Deployments, components, pipelines, stages and steps
pub static RUN_TABLE: TransitionTable<RunStatus> = TransitionTable::new(RUN_EDGES);

const INFRASTRUCTURE_EDGES: &[Edge<InfrastructureStatus>] = &[
    edge(InfrastructureStatus::Provisioning, Operation::Activate, InfrastructureStatus::Active, Stamp::None),
    edge(InfrastructureStatus::Updating, Operation::Activate, InfrastructureStatus::Active, Stamp::None),
    edge(InfrastructureStatus::Active, Operation::Update, InfrastructureStatus::Updating, Stamp::None),
    edge(InfrastructureStatus::Provisioning, Operation::Fail, InfrastructureStatus::Failed, Stamp::None),
    edge(InfrastructureStatus::Active, Operation::Fail, InfrastructureStatus::Failed, Stamp::None),
    edge(InfrastructureStatus::Updating, Operation::Fail, InfrastructureStatus::Failed, Stamp::None),
    edge(InfrastructureStatus::Provisioning, Operation::Delete, InfrastructureStatus::Deleting, Stamp::None),
    edge(InfrastructureStatus::Active, Operation::Delete, InfrastructureStatus::Deleting, Stamp::None),
    edge(InfrastructureStatus::Updating, Operation::Delete, InfrastructureStatus::Deleting, Stamp::None),
    edge(InfrastructureStatus::Failed, Operation::Delete, InfrastructureStatus::Deleting, Stamp::None),
];

/// Infrastructure has no run timestamps; `updated_at` is kept by the entity.
/// ACTIVE <-> UPDATING may cycle, FAILED can still be deleted, and DELETING is
/// the only terminal state.
pub static INFRASTRUCTURE_TABLE: TransitionTable<InfrastructureStatus> =
    TransitionTable::new(INFRASTRUCTURE_EDGES);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_terminal_states() {
        assert!(!RUN_TABLE.is_terminal(RunStatus::Pending));
        assert!(!RUN_TABLE.is_terminal(RunStatus::InProgress));
        assert!(RUN_TABLE.is_terminal(RunStatus::Completed));
        assert!(RUN_TABLE.is_terminal(RunStatus::Failed));
        assert!(RUN_TABLE.is_terminal(RunStatus::Cancelled));
    }

    #[test]
    fn test_infrastructure_terminal_states() {
        let terminal: Vec<_> = InfrastructureStatus::ALL
            .iter()
            .copied()
            .filter(|s| INFRASTRUCTURE_TABLE.is_terminal(*s))
            .collect();
        assert_eq!(terminal, vec![InfrastructureStatus::Deleting]);
    }

    #[test]
    fn test_tables_have_no_duplicate_edges() {
        for (i, a) in RUN_TABLE.edges().iter().enumerate() {
            for b in &RUN_TABLE.edges()[i + 1..] {
                assert!(!(a.from == b.from && a.operation == b.operation));
            }
        }
        for (i, a) in INFRASTRUCTURE_TABLE.edges().iter().enumerate() {
            for b in &INFRASTRUCTURE_TABLE.edges()[i + 1..] {
                assert!(!(a.from == b.from && a.operation == b.operation));
            }
        }
    }

    #[test]
    fn test_operations_from_pending() {
        let ops: Vec<_> = RUN_TABLE.operations_from(RunStatus::Pending).collect();
        assert_eq!(ops, vec![Operation::Start, Operation::Cancel]);
    }

    #[test]
    fn test_only_run_entry_edge_stamps_started() {
        let started: Vec<_> = RUN_TABLE
            .edges()
            .iter()
            .filter(|e| e.stamp == Stamp::Started)
            .collect();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].from, RunStatus::Pending);
        assert!(
            INFRASTRUCTURE_TABLE
                .edges()
                .iter()
                .all(|e| e.stamp == Stamp::None)
        );
    }
}
