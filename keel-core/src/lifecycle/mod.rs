//! Lifecycle state machine
//!
//! One table-driven state machine shared by every lifecycle-bearing entity.
//! An entity kind supplies its [`TransitionTable`] through [`Stateful`]; the
//! machine looks up `(current status, operation)` and either applies the edge
//! (status change plus timestamp stamping) or returns a [`TransitionError`]
//! without touching the entity.
//!
//! The machine holds no locks. Callers that share an entity across tasks must
//! serialize the read-check-mutate-write sequence themselves (the orchestrator
//! does it with a row lock inside a database transaction).

pub mod status;
pub mod table;

pub use status::{InfrastructureStatus, LifecycleStatus, RunStatus};
pub use table::{Edge, INFRASTRUCTURE_TABLE, RUN_TABLE, Stamp, TransitionTable};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of characters kept from a failure reason
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Named transition operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Start,
    Complete,
    Fail,
    Cancel,
    Activate,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Start,
        Operation::Complete,
        Operation::Fail,
        Operation::Cancel,
        Operation::Activate,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Complete => "complete",
            Operation::Fail => "fail",
            Operation::Cancel => "cancel",
            Operation::Activate => "activate",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity kinds that carry a lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Deployment,
    DeploymentComponent,
    Pipeline,
    PipelineStage,
    PipelineStep,
    Infrastructure,
}

impl EntityKind {
    /// Human-readable name used in messages
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Deployment => "deployment",
            EntityKind::DeploymentComponent => "deployment component",
            EntityKind::Pipeline => "pipeline",
            EntityKind::PipelineStage => "pipeline stage",
            EntityKind::PipelineStep => "pipeline step",
            EntityKind::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current state has no edge for the requested operation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("cannot {operation} {kind} {entity_id} while it is {current}")]
pub struct TransitionError {
    pub kind: EntityKind,
    pub entity_id: Uuid,
    pub operation: Operation,
    pub current: String,
}

/// Current time at the precision the store keeps (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Cut a failure reason down to [`MAX_ERROR_MESSAGE_CHARS`] characters
pub fn bounded_message(reason: &str) -> String {
    reason.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

/// Stamps a stored lifecycle carries that no transition could have produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("completed_at {completed} is not after started_at {started}")]
pub struct InconsistentLifecycle {
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
}

/// Status plus the fields the state machine stamps
///
/// Fields are private and there is no public constructor for an arbitrary
/// status: entities start in their initial state and then change only
/// through [`Stateful::transition`]. The one exception is
/// [`Lifecycle::restore`], which exists for the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle<S> {
    status: S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl<S: LifecycleStatus> Lifecycle<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            status: initial,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Rebuild a lifecycle loaded from storage
    ///
    /// Persistence only. Anything else must go through the transition table.
    /// Stamps that break the completed-after-started ordering are rejected.
    #[doc(hidden)]
    pub fn restore(
        status: S,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        error_message: Option<String>,
    ) -> Result<Self, InconsistentLifecycle> {
        if let (Some(started), Some(completed)) = (started_at, completed_at) {
            if completed <= started {
                return Err(InconsistentLifecycle { started, completed });
            }
        }
        Ok(Self {
            status,
            started_at,
            completed_at,
            error_message,
        })
    }

    pub fn status(&self) -> S {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Apply `operation` or hand back the unchanged current status
    fn apply(
        &mut self,
        table: &TransitionTable<S>,
        operation: Operation,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<&'static Edge<S>, S> {
        let edge = table.lookup(self.status, operation).ok_or(self.status)?;

        match edge.stamp {
            Stamp::None => {}
            Stamp::Started => {
                if self.started_at.is_none() {
                    self.started_at = Some(at);
                }
            }
            Stamp::Completed => self.completed_at = Some(self.not_before_start(at)),
        }

        if operation == Operation::Fail {
            if let Some(reason) = reason {
                self.error_message = Some(bounded_message(reason));
            }
        }

        self.status = edge.to;
        Ok(edge)
    }

    // completed_at must sort strictly after started_at even when both land on
    // the same clock tick.
    fn not_before_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self.started_at {
            Some(started) if at <= started => started + TimeDelta::microseconds(1),
            _ => at,
        }
    }
}

/// An entity whose status is guarded by a transition table
pub trait Stateful {
    type Status: LifecycleStatus;

    const KIND: EntityKind;

    fn table() -> &'static TransitionTable<Self::Status>;

    fn id(&self) -> Uuid;

    fn lifecycle(&self) -> &Lifecycle<Self::Status>;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<Self::Status>;

    /// Hook run after every successful transition
    fn after_transition(&mut self, _operation: Operation, _reason: Option<&str>, _at: DateTime<Utc>) {}

    fn status(&self) -> Self::Status {
        self.lifecycle().status()
    }

    fn is_terminal(&self) -> bool {
        Self::table().is_terminal(self.status())
    }

    /// Whether `operation` has an edge from the current status
    fn can(&self, operation: Operation) -> bool {
        Self::table().lookup(self.status(), operation).is_some()
    }

    fn transition(
        &mut self,
        operation: Operation,
        reason: Option<&str>,
    ) -> Result<Self::Status, TransitionError> {
        self.transition_at(operation, reason, now())
    }

    fn transition_at(
        &mut self,
        operation: Operation,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Self::Status, TransitionError> {
        let entity_id = self.id();
        match self.lifecycle_mut().apply(Self::table(), operation, reason, at) {
            Ok(edge) => {
                self.after_transition(operation, reason, at);
                Ok(edge.to)
            }
            Err(current) => Err(TransitionError {
                kind: Self::KIND,
                entity_id,
                operation,
                current: current.to_string(),
            }),
        }
    }
}

/// Named operations for every entity on [`RUN_TABLE`]
pub trait RunLifecycle: Stateful<Status = RunStatus> {
    fn start(&mut self) -> Result<RunStatus, TransitionError> {
        self.transition(Operation::Start, None)
    }

    fn complete(&mut self) -> Result<RunStatus, TransitionError> {
        self.transition(Operation::Complete, None)
    }

    fn fail(&mut self, reason: Option<&str>) -> Result<RunStatus, TransitionError> {
        self.transition(Operation::Fail, reason)
    }

    fn cancel(&mut self) -> Result<RunStatus, TransitionError> {
        self.transition(Operation::Cancel, None)
    }
}

impl<T: Stateful<Status = RunStatus>> RunLifecycle for T {}

/// What happens to children when their parent is cancelled or fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadePolicy {
    /// Children keep their status; callers settle them explicitly
    #[default]
    Manual,
    /// Every child that can still be cancelled is cancelled
    Propagate,
}

impl std::str::FromStr for CascadePolicy {
    type Err = crate::names::UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(CascadePolicy::Manual),
            "propagate" => Ok(CascadePolicy::Propagate),
            _ => Err(crate::names::UnknownName {
                kind: "cascade policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Cancel every child that still has a cancel edge; returns how many changed
pub fn cancel_open<'a, C, I>(children: I, at: DateTime<Utc>) -> usize
where
    C: Stateful + 'a,
    I: IntoIterator<Item = &'a mut C>,
{
    children
        .into_iter()
        .filter(|child| child.can(Operation::Cancel))
        .filter_map(|child| child.transition_at(Operation::Cancel, None, at).ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal entity for exercising the machine against both tables
    #[derive(Debug, Clone)]
    struct Subject<S> {
        id: Uuid,
        lifecycle: Lifecycle<S>,
    }

    impl Stateful for Subject<RunStatus> {
        type Status = RunStatus;
        const KIND: EntityKind = EntityKind::Pipeline;

        fn table() -> &'static TransitionTable<RunStatus> {
            &RUN_TABLE
        }
        fn id(&self) -> Uuid {
            self.id
        }
        fn lifecycle(&self) -> &Lifecycle<RunStatus> {
            &self.lifecycle
        }
        fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
            &mut self.lifecycle
        }
    }

    impl Stateful for Subject<InfrastructureStatus> {
        type Status = InfrastructureStatus;
        const KIND: EntityKind = EntityKind::Infrastructure;

        fn table() -> &'static TransitionTable<InfrastructureStatus> {
            &INFRASTRUCTURE_TABLE
        }
        fn id(&self) -> Uuid {
            self.id
        }
        fn lifecycle(&self) -> &Lifecycle<InfrastructureStatus> {
            &self.lifecycle
        }
        fn lifecycle_mut(&mut self) -> &mut Lifecycle<InfrastructureStatus> {
            &mut self.lifecycle
        }
    }

    fn subject<S: LifecycleStatus>(status: S) -> Subject<S> {
        Subject {
            id: Uuid::new_v4(),
            lifecycle: Lifecycle::restore(status, None, None, None).unwrap(),
        }
    }

    /// Every (state, operation) pair outside the table is rejected and leaves
    /// the lifecycle untouched.
    fn assert_misses_are_inert<S: LifecycleStatus>()
    where
        Subject<S>: Stateful<Status = S>,
    {
        for &status in S::variants() {
            for operation in Operation::ALL {
                if <Subject<S> as Stateful>::table().lookup(status, operation).is_some() {
                    continue;
                }
                let started = Utc::now() - TimeDelta::minutes(5);
                let mut entity = Subject {
                    id: Uuid::new_v4(),
                    lifecycle: Lifecycle::restore(status, Some(started), None, None).unwrap(),
                };
                let before = entity.lifecycle.clone();

                let err = entity
                    .transition(operation, Some("boom"))
                    .expect_err("edge is not in the table");

                assert_eq!(err.operation, operation);
                assert_eq!(err.entity_id, entity.id);
                assert_eq!(err.current, status.to_string());
                assert_eq!(entity.lifecycle, before);
            }
        }
    }

    #[test]
    fn test_run_table_misses_leave_entity_unchanged() {
        assert_misses_are_inert::<RunStatus>();
    }

    #[test]
    fn test_infrastructure_table_misses_leave_entity_unchanged() {
        assert_misses_are_inert::<InfrastructureStatus>();
    }

    #[test]
    fn test_every_run_edge_is_applied() {
        for edge in RUN_TABLE.edges() {
            let mut entity = subject(edge.from);
            let to = entity.transition(edge.operation, None).unwrap();
            assert_eq!(to, edge.to);
            assert_eq!(entity.status(), edge.to);
        }
    }

    #[test]
    fn test_start_then_complete_orders_timestamps() {
        let mut entity = subject(RunStatus::Pending);
        entity.start().unwrap();
        entity.complete().unwrap();

        let started = entity.lifecycle.started_at().unwrap();
        let completed = entity.lifecycle.completed_at().unwrap();
        assert!(completed > started);
    }

    #[test]
    fn test_completed_at_never_equals_started_at() {
        let at = now();
        let mut entity = subject(RunStatus::Pending);
        entity.transition_at(Operation::Start, None, at).unwrap();
        entity.transition_at(Operation::Complete, None, at).unwrap();

        assert_eq!(entity.lifecycle.started_at(), Some(at));
        assert_eq!(
            entity.lifecycle.completed_at(),
            Some(at + TimeDelta::microseconds(1))
        );
    }

    #[test]
    fn test_second_start_fails_and_keeps_started_at() {
        let mut entity = subject(RunStatus::Pending);
        entity.start().unwrap();
        let first = entity.lifecycle.started_at();

        let err = entity.start().unwrap_err();
        assert_eq!(err.current, "IN_PROGRESS");
        assert_eq!(entity.status(), RunStatus::InProgress);
        assert_eq!(entity.lifecycle.started_at(), first);
    }

    #[test]
    fn test_cancel_from_pending_stamps_only_completed() {
        let mut entity = subject(RunStatus::Pending);
        entity.cancel().unwrap();
        assert_eq!(entity.status(), RunStatus::Cancelled);
        assert!(entity.lifecycle.started_at().is_none());
        assert!(entity.lifecycle.completed_at().is_some());
    }

    #[test]
    fn test_fail_records_bounded_reason() {
        let mut entity = subject(RunStatus::Pending);
        entity.start().unwrap();
        let reason = "é".repeat(MAX_ERROR_MESSAGE_CHARS + 50);
        entity.fail(Some(&reason)).unwrap();

        let message = entity.lifecycle.error_message().unwrap();
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert!(entity.lifecycle.completed_at().is_some());
    }

    #[test]
    fn test_fail_without_reason_leaves_message_empty() {
        let mut entity = subject(RunStatus::InProgress);
        entity.fail(None).unwrap();
        assert_eq!(entity.status(), RunStatus::Failed);
        assert!(entity.lifecycle.error_message().is_none());
    }

    #[test]
    fn test_infrastructure_fail_does_not_stamp_completed() {
        let mut entity = subject(InfrastructureStatus::Active);
        entity
            .transition(Operation::Fail, Some("quota exceeded"))
            .unwrap();
        assert_eq!(entity.status(), InfrastructureStatus::Failed);
        assert!(entity.lifecycle.completed_at().is_none());
        assert_eq!(entity.lifecycle.error_message(), Some("quota exceeded"));
    }

    #[test]
    fn test_restore_rejects_impossible_stamps() {
        let started = now();
        let err = Lifecycle::restore(RunStatus::Completed, Some(started), Some(started), None)
            .unwrap_err();
        assert_eq!(err.started, started);

        let restored = Lifecycle::restore(
            RunStatus::Completed,
            Some(started),
            Some(started + TimeDelta::seconds(2)),
            None,
        )
        .unwrap();
        assert_eq!(restored.status(), RunStatus::Completed);
    }

    #[test]
    fn test_now_is_microsecond_precision() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_cancel_open_skips_terminal_children() {
        let mut children = vec![
            subject(RunStatus::Pending),
            subject(RunStatus::InProgress),
            subject(RunStatus::Completed),
            subject(RunStatus::Failed),
        ];
        let changed = cancel_open(children.iter_mut(), now());

        assert_eq!(changed, 2);
        let statuses: Vec<_> = children.iter().map(|c| c.status()).collect();
        assert_eq!(
            statuses,
            vec![
                RunStatus::Cancelled,
                RunStatus::Cancelled,
                RunStatus::Completed,
                RunStatus::Failed
            ]
        );
    }

    #[test]
    fn test_cascade_policy_parse() {
        assert_eq!("manual".parse(), Ok(CascadePolicy::Manual));
        assert_eq!("Propagate".parse(), Ok(CascadePolicy::Propagate));
        assert!("sometimes".parse::<CascadePolicy>().is_err());
    }

    #[test]
    fn test_transition_error_message() {
        let err = TransitionError {
            kind: EntityKind::PipelineStage,
            entity_id: Uuid::nil(),
            operation: Operation::Complete,
            current: "PENDING".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot complete pipeline stage 00000000-0000-0000-0000-000000000000 while it is PENDING"
        );
    }
}
